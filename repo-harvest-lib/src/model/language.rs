use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// A language ecosystem the pipeline can harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Language {
    Go,
    Python,
    Java,
    Rust,
    Ruby,
    Node,
    Php,
    Javascript,
    Typescript,
}

impl Language {
    /// The value used for the search API's `language:` qualifier.
    #[must_use]
    pub const fn search_qualifier(self) -> &'static str {
        match self {
            Self::Go => "go",
            Self::Python => "python",
            Self::Java => "java",
            Self::Rust => "rust",
            Self::Ruby => "ruby",
            Self::Node | Self::Javascript => "javascript",
            Self::Php => "php",
            Self::Typescript => "typescript",
        }
    }

    /// Dependency manifests and lock files worth fetching for this ecosystem, as paths
    /// relative to the repository root.
    #[must_use]
    pub const fn manifests(self) -> &'static [&'static str] {
        match self {
            Self::Go => &["go.mod", "go.sum", "vendor/modules.txt", "Gopkg.toml", "Gopkg.lock", "glide.yaml", "glide.lock"],
            Self::Python => &[
                "requirements.txt",
                "uv.lock",
                "poetry.lock",
                "pyproject.toml",
                "Pipfile.lock",
                "Pipfile",
                "environment.yml",
                "setup.py",
                "setup.cfg",
            ],
            Self::Java => &["pom.xml", "build.gradle", "build.gradle.kts"],
            Self::Rust => &["Cargo.toml", "Cargo.lock"],
            Self::Ruby => &["Gemfile", "Gemfile.lock"],
            Self::Node | Self::Javascript | Self::Typescript => {
                &["package-lock.json", "yarn.lock", "pnpm-lock.yaml", "package.json", "npm-shrinkwrap.json"]
            }
            Self::Php => &["composer.lock", "composer.json"],
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn display_and_parse_agree() {
        for language in Language::iter() {
            assert_eq!(language.to_string().parse::<Language>().unwrap(), language);
        }
    }

    #[test]
    fn every_language_has_manifests() {
        assert!(Language::iter().all(|l| !l.manifests().is_empty()));
    }

    #[test]
    fn node_searches_as_javascript() {
        assert_eq!(Language::Node.search_qualifier(), "javascript");
        assert_eq!(Language::Rust.search_qualifier(), "rust");
    }
}
