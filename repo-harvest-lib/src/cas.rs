//! Content-addressable cache for derived artifacts.
//!
//! An artifact derived from a directory (an SBOM generated from a set of manifests, say) depends
//! only on that directory's files. [`ContentCache`] keys artifacts by a digest of every relative
//! path and its bytes, so repositories with identical inputs share one derivation. Cached
//! artifacts are trusted as-is on read.

use crate::Result;
use crate::path_utils::write_atomically;
use core::future::Future;
use core::time::Duration;
use ohno::{IntoAppError, bail};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use walkdir::WalkDir;

const LOG_TARGET: &str = "       cas";

/// Placeholder in a command template that is replaced with the input directory.
pub const DIR_PLACEHOLDER: &str = "{dir}";

/// Produces an artifact from the files in a directory.
pub trait ArtifactGenerator: Send + Sync {
    fn generate(&self, dir: &Path) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// Runs an external command and captures its standard output as the artifact.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    /// `argv` is a command template; each `{dir}` is replaced with the input directory.
    pub fn new(argv: Vec<String>, timeout: Duration) -> Result<Self> {
        if argv.is_empty() {
            bail!("artifact command is empty");
        }
        Ok(Self { argv, timeout })
    }
}

impl ArtifactGenerator for CommandGenerator {
    async fn generate(&self, dir: &Path) -> Result<Vec<u8>> {
        let dir_str = dir.to_str().into_app_err("input directory path is not valid UTF-8")?;
        let args: Vec<String> = self.argv.iter().map(|a| a.replace(DIR_PLACEHOLDER, dir_str)).collect();
        let Some((program, rest)) = args.split_first() else {
            bail!("artifact command is empty");
        };

        let child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .into_app_err_with(|| format!("could not start '{program}'"))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.into_app_err_with(|| format!("'{program}' failed to run"))?,
            Err(_) => bail!("'{program}' timed out after {} seconds", self.timeout.as_secs()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let snippet: String = stderr.trim().chars().take(500).collect();
            bail!("'{program}' exited with {}: {snippet}", output.status);
        }

        Ok(output.stdout)
    }
}

/// Deterministic digest of every file below `dir`.
///
/// Files are visited in sorted relative-path order; each contributes its path (with `/`
/// separators) and its contents, both length-prefixed.
pub fn digest(dir: &Path) -> Result<String> {
    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.into_app_err_with(|| format!("walking '{}'", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .into_app_err("walked outside the input directory")?
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        files.push((relative, entry.into_path()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (relative, path) in &files {
        let bytes = fs::read(path).into_app_err_with(|| format!("reading '{}'", path.display()))?;
        hasher.update((relative.len() as u64).to_le_bytes());
        hasher.update(relative.as_bytes());
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Artifacts keyed by input digest.
#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
}

impl ContentCache {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.json"))
    }

    pub fn get(&self, hash: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.entry_path(hash)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).into_app_err_with(|| format!("reading cached artifact {hash}")),
        }
    }

    pub fn put(&self, hash: &str, artifact: &[u8]) -> Result<()> {
        write_atomically(&self.entry_path(hash), artifact)
    }

    /// Write the artifact for `input_dir` to `output`, deriving it only on a cache miss.
    ///
    /// Returns whether the cache supplied it. Hashing and file writes run on the blocking pool.
    pub async fn derive<G: ArtifactGenerator>(&self, generator: &G, input_dir: &Path, output: &Path) -> Result<bool> {
        let cache = self.clone();
        let (input, out) = (input_dir.to_path_buf(), output.to_path_buf());
        let (hash, reused) = blocking(move || {
            let hash = digest(&input)?;
            match cache.get(&hash)? {
                Some(artifact) => {
                    write_atomically(&out, &artifact)?;
                    Ok((hash, true))
                }
                None => Ok((hash, false)),
            }
        })
        .await?;

        if reused {
            log::debug!(target: LOG_TARGET, "Reusing artifact {hash} for '{}'", input_dir.display());
            return Ok(true);
        }

        let artifact = generator.generate(input_dir).await?;
        let size = artifact.len();
        let cache = self.clone();
        let (key, out) = (hash.clone(), output.to_path_buf());
        blocking(move || {
            cache.put(&key, &artifact)?;
            write_atomically(&out, &artifact)
        })
        .await?;

        log::debug!(target: LOG_TARGET, "Derived artifact {hash} ({size} bytes) for '{}'", input_dir.display());
        Ok(false)
    }
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.into_app_err("artifact cache task failed")?
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingGenerator {
        calls: AtomicUsize,
    }

    impl ArtifactGenerator for CountingGenerator {
        async fn generate(&self, dir: &Path) -> Result<Vec<u8>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{{\"files\":{},\"run\":{n}}}", fs::read_dir(dir).unwrap().count()).into_bytes())
        }
    }

    fn populate(dir: &Path, files: &[(&str, &str)]) {
        for (name, content) in files {
            let path = dir.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
    }

    #[test]
    fn digest_ignores_creation_order() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        populate(a.path(), &[("go.mod", "module x"), ("sub/go.sum", "h1:abc")]);
        populate(b.path(), &[("sub/go.sum", "h1:abc"), ("go.mod", "module x")]);

        assert_eq!(digest(a.path()).unwrap(), digest(b.path()).unwrap());
    }

    #[test]
    fn digest_depends_on_paths_and_bytes() {
        let base = tempfile::tempdir().unwrap();
        let edited = tempfile::tempdir().unwrap();
        let renamed = tempfile::tempdir().unwrap();
        populate(base.path(), &[("package.json", "{}")]);
        populate(edited.path(), &[("package.json", "{ }")]);
        populate(renamed.path(), &[("package-lock.json", "{}")]);

        let d = digest(base.path()).unwrap();
        assert_ne!(d, digest(edited.path()).unwrap());
        assert_ne!(d, digest(renamed.path()).unwrap());
        assert_eq!(d.len(), 64);
    }

    #[test]
    fn get_and_put() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(tmp.path().join("sbom"));
        assert!(cache.get("feed").unwrap().is_none());
        cache.put("feed", b"artifact").unwrap();
        assert_eq!(cache.get("feed").unwrap().unwrap(), b"artifact");
    }

    #[tokio::test]
    async fn identical_inputs_share_one_derivation() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("repo-a");
        let second = tmp.path().join("repo-b");
        populate(&first, &[("Cargo.toml", "[package]"), ("Cargo.lock", "v3")]);
        populate(&second, &[("Cargo.lock", "v3"), ("Cargo.toml", "[package]")]);

        let cache = ContentCache::new(tmp.path().join("cache"));
        let generator = CountingGenerator::default();

        let out_a = tmp.path().join("out/a.json");
        let out_b = tmp.path().join("out/b.json");
        assert!(!cache.derive(&generator, &first, &out_a).await.unwrap());
        assert!(cache.derive(&generator, &second, &out_b).await.unwrap());

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read(&out_a).unwrap(), fs::read(&out_b).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_derivations_of_distinct_inputs() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("one");
        let second = tmp.path().join("two");
        populate(&first, &[("go.mod", "module one")]);
        populate(&second, &[("go.mod", "module two"), ("go.sum", "h1:two")]);

        let cache = ContentCache::new(tmp.path().join("cache"));
        let generator = CountingGenerator::default();
        let (out_a, out_b) = (tmp.path().join("out/one.json"), tmp.path().join("out/two.json"));

        let (a, b) = tokio::join!(cache.derive(&generator, &first, &out_a), cache.derive(&generator, &second, &out_b));
        assert!(!a.unwrap());
        assert!(!b.unwrap());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fs::read_dir(tmp.path().join("cache")).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn missing_input_directory_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(tmp.path().join("cache"));
        let generator = CountingGenerator::default();

        let result = cache.derive(&generator, &tmp.path().join("absent"), &tmp.path().join("out.json")).await;
        assert!(result.is_err());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_generator_captures_stdout() {
        let tmp = tempfile::tempdir().unwrap();
        populate(tmp.path(), &[("manifest.txt", "dependency-list")]);

        let generator = CommandGenerator::new(vec!["cat".into(), "{dir}/manifest.txt".into()], Duration::from_secs(10)).unwrap();
        assert_eq!(generator.generate(tmp.path()).await.unwrap(), b"dependency-list");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_generator_reports_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let generator = CommandGenerator::new(vec!["cat".into(), "{dir}/missing".into()], Duration::from_secs(10)).unwrap();
        assert!(generator.generate(tmp.path()).await.is_err());
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandGenerator::new(Vec::new(), Duration::from_secs(1)).is_err());
    }
}
