//! Filesystem package store using the BagIt 0.97 layout
//!
//! Packages live under `{base_dir}/oulib_tasks/{task_id}/derivative/{name}`.
//! A package directory holds `bagit.txt`, `bag-info.txt`, one
//! `manifest-{algorithm}.txt` per checksum algorithm, the payload in `data/`,
//! and `tagmanifest-{algorithm}.txt` covering every other top-level file.

use async_trait::async_trait;
use md5::Md5;
use recipe_writer_domain::{ManifestSource, Package, PackageError, PackageFile, PackageStore};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use walkdir::WalkDir;

const TASKS_DIR: &str = "oulib_tasks";
const DERIVATIVE_DIR: &str = "derivative";
const PAYLOAD_DIR: &str = "data";
const STAGING_DIR: &str = ".bagit-staging";
const BAGIT_FILE: &str = "bagit.txt";
const INFO_FILE: &str = "bag-info.txt";
const BAGIT_DECLARATION: &str = "BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n";

const DATE_KEY: &str = "Bagging-Date";
const AGENT_KEY: &str = "Bag-Software-Agent";
const OXUM_KEY: &str = "Payload-Oxum";

/// Checksum algorithms written to package manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    pub const ALL: [ChecksumAlgorithm; 2] = [ChecksumAlgorithm::Md5, ChecksumAlgorithm::Sha256];

    pub fn name(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Sha256 => "sha256",
        }
    }

    fn digest_file(self, path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let digest = match self {
            ChecksumAlgorithm::Md5 => {
                let mut hasher = Md5::new();
                io::copy(&mut file, &mut hasher)?;
                format!("{:x}", hasher.finalize())
            }
            ChecksumAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                io::copy(&mut file, &mut hasher)?;
                format!("{:x}", hasher.finalize())
            }
        };
        Ok(digest)
    }
}

/// Package store backed by BagIt directories on the local filesystem.
///
/// Hashing and file moves run on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct FsPackageStore {
    base_dir: PathBuf,
    algorithms: Vec<ChecksumAlgorithm>,
}

impl FsPackageStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            algorithms: ChecksumAlgorithm::ALL.to_vec(),
        }
    }

    pub fn with_algorithms(mut self, algorithms: Vec<ChecksumAlgorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Directory holding the derivative packages of a task
    pub fn derivative_area(&self, task_id: &str) -> PathBuf {
        self.base_dir
            .join(TASKS_DIR)
            .join(task_id)
            .join(DERIVATIVE_DIR)
    }

    fn write_payload_manifests(&self, root: &Path) -> io::Result<String> {
        let payload = payload_files(root)?;
        for algorithm in &self.algorithms {
            write_manifest(root, "manifest", *algorithm, &payload)?;
        }
        payload_oxum(&payload)
    }

    fn write_tag_manifests(&self, root: &Path) -> io::Result<()> {
        let tags = tag_files(root)?;
        for algorithm in &self.algorithms {
            write_manifest(root, "tagmanifest", *algorithm, &tags)?;
        }
        Ok(())
    }

    fn create_package(&self, path: &Path) -> Result<Package, PackageError> {
        if is_package(path) {
            return open_package(path);
        }
        if !path.is_dir() {
            return Err(not_found(path));
        }

        stage_payload(path)?;
        std::fs::write(path.join(BAGIT_FILE), BAGIT_DECLARATION)?;
        let oxum = self.write_payload_manifests(path)?;

        let mut info = BTreeMap::new();
        info.insert(DATE_KEY.to_string(), today());
        info.insert(
            AGENT_KEY.to_string(),
            format!("recipe-writer v{}", env!("CARGO_PKG_VERSION")),
        );
        info.insert(OXUM_KEY.to_string(), oxum);
        write_info(path, &info)?;
        self.write_tag_manifests(path)?;

        tracing::info!(path = %path.display(), "Created package");
        open_package(path)
    }

    fn save_package(&self, package: &Package, update_manifests: bool) -> Result<Package, PackageError> {
        let root = &package.path;
        if !is_package(root) {
            return Err(PackageError::NotAPackage(root.display().to_string()));
        }

        let mut info = package.info.clone();
        if update_manifests {
            let oxum = self.write_payload_manifests(root)?;
            info.insert(OXUM_KEY.to_string(), oxum);
        }
        info.entry(DATE_KEY.to_string()).or_insert_with(today);

        write_info(root, &info)?;
        self.write_tag_manifests(root)?;

        tracing::debug!(package = %package.name, update_manifests, "Saved package");
        open_package(root)
    }
}

/// Run filesystem work on the blocking pool
async fn blocking<T, F>(work: F) -> Result<T, PackageError>
where
    F: FnOnce() -> Result<T, PackageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PackageError::Io(io::Error::other(e)))?
}

fn open_package(path: &Path) -> Result<Package, PackageError> {
    if !path.is_dir() {
        return Err(not_found(path));
    }
    if !is_package(path) {
        return Err(PackageError::NotAPackage(path.display().to_string()));
    }

    let info = read_info(path)?;
    let manifests = read_manifests(path)?;
    if manifests.is_empty() {
        return Err(PackageError::Invalid {
            path: path.display().to_string(),
            message: "no payload manifest".to_string(),
        });
    }

    Ok(Package {
        name: Package::resolve_name(path, &info),
        path: path.to_path_buf(),
        info,
        manifests,
    })
}

fn is_package(path: &Path) -> bool {
    path.join(BAGIT_FILE).is_file()
}

fn not_found(path: &Path) -> PackageError {
    PackageError::Io(io::Error::new(
        io::ErrorKind::NotFound,
        format!("Directory not found: {}", path.display()),
    ))
}

fn today() -> String {
    OffsetDateTime::now_utc().date().to_string()
}

/// Path relative to the package root, always with `/` separators
fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parse `bag-info.txt`; indented lines continue the previous value
fn parse_info(content: &str) -> BTreeMap<String, String> {
    let mut info: BTreeMap<String, String> = BTreeMap::new();
    let mut last_key: Option<String> = None;

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(value) = last_key.as_ref().and_then(|key| info.get_mut(key)) {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_string();
            info.insert(key.clone(), value.trim().to_string());
            last_key = Some(key);
        }
    }

    info
}

fn read_info(root: &Path) -> io::Result<BTreeMap<String, String>> {
    let path = root.join(INFO_FILE);
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }
    Ok(parse_info(&std::fs::read_to_string(path)?))
}

fn write_info(root: &Path, info: &BTreeMap<String, String>) -> io::Result<()> {
    let content: String = info
        .iter()
        .map(|(key, value)| format!("{}: {}\n", key, value))
        .collect();
    std::fs::write(root.join(INFO_FILE), content)
}

fn read_manifests(root: &Path) -> io::Result<Vec<ManifestSource>> {
    let mut manifests = Vec::new();

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(algorithm) = name
            .strip_prefix("manifest-")
            .and_then(|rest| rest.strip_suffix(".txt"))
        else {
            continue;
        };
        let content = std::fs::read_to_string(entry.path())?;
        manifests.push(ManifestSource::new(algorithm, content));
    }

    manifests.sort_by(|a, b| a.algorithm.cmp(&b.algorithm));
    Ok(manifests)
}

/// Payload files as `(relative path, absolute path)`, sorted by path
fn payload_files(root: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root.join(PAYLOAD_DIR)).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push((relative_name(root, entry.path()), entry.path().to_path_buf()));
        }
    }

    files.sort();
    Ok(files)
}

/// Tag files: everything outside `data/` except the tag manifests themselves
fn tag_files(root: &Path) -> io::Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_name() == PAYLOAD_DIR));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = relative_name(root, entry.path());
        if name.starts_with("tagmanifest-") {
            continue;
        }
        files.push((name, entry.path().to_path_buf()));
    }

    files.sort();
    Ok(files)
}

fn write_manifest(
    root: &Path,
    prefix: &str,
    algorithm: ChecksumAlgorithm,
    files: &[(String, PathBuf)],
) -> io::Result<()> {
    let mut content = String::new();
    for (name, path) in files {
        content.push_str(&algorithm.digest_file(path)?);
        content.push_str("  ");
        content.push_str(name);
        content.push('\n');
    }

    std::fs::write(
        root.join(format!("{}-{}.txt", prefix, algorithm.name())),
        content,
    )
}

/// `Payload-Oxum`: total octets and file count
fn payload_oxum(files: &[(String, PathBuf)]) -> io::Result<String> {
    let mut octets = 0u64;
    for (_, path) in files {
        octets += std::fs::metadata(path)?.len();
    }
    Ok(format!("{}.{}", octets, files.len()))
}

/// Move every entry of `root` into a fresh `data/` directory
fn stage_payload(root: &Path) -> io::Result<()> {
    let staging = root.join(STAGING_DIR);
    std::fs::create_dir(&staging)?;

    let entries: Vec<_> = std::fs::read_dir(root)?.collect::<Result<_, _>>()?;
    for entry in entries {
        if entry.file_name() == STAGING_DIR {
            continue;
        }
        std::fs::rename(entry.path(), staging.join(entry.file_name()))?;
    }

    std::fs::rename(&staging, root.join(PAYLOAD_DIR))
}

/// Files directly inside `dir` whose name contains a dot
fn dotted_files(dir: &Path, in_payload: bool) -> io::Result<Vec<PackageFile>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && entry.file_name().to_string_lossy().contains('.') {
            files.push(PackageFile {
                local_path: path,
                in_payload,
            });
        }
    }

    files.sort_by(|a, b| a.local_path.cmp(&b.local_path));
    Ok(files)
}

#[async_trait]
impl PackageStore for FsPackageStore {
    async fn derivative_dirs(&self, task_id: &str) -> Result<Vec<PathBuf>, PackageError> {
        let area = self.derivative_area(task_id);
        if !area.is_dir() {
            return Err(not_found(&area));
        }

        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&area)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }

        dirs.sort();
        tracing::debug!(area = %area.display(), count = dirs.len(), "Listed derivative directories");
        Ok(dirs)
    }

    fn package_path(&self, task_id: &str, name: &str) -> PathBuf {
        self.derivative_area(task_id).join(name)
    }

    async fn open(&self, path: &Path) -> Result<Package, PackageError> {
        let path = path.to_path_buf();
        blocking(move || open_package(&path)).await
    }

    async fn create(&self, path: &Path) -> Result<Package, PackageError> {
        let store = self.clone();
        let path = path.to_path_buf();
        blocking(move || store.create_package(&path)).await
    }

    async fn save(
        &self,
        package: &Package,
        update_manifests: bool,
    ) -> Result<Package, PackageError> {
        let store = self.clone();
        let package = package.clone();
        blocking(move || store.save_package(&package, update_manifests)).await
    }

    async fn write_file(
        &self,
        package: &Package,
        name: &str,
        contents: &[u8],
    ) -> Result<PathBuf, PackageError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(PackageError::Invalid {
                path: package.path.display().to_string(),
                message: format!("invalid tag file name {:?}", name),
            });
        }

        let target = package.path.join(name);
        std::fs::write(&target, contents)?;
        Ok(target)
    }

    async fn upload_files(&self, package: &Package) -> Result<Vec<PackageFile>, PackageError> {
        let mut files = dotted_files(&package.path, false)?;
        files.extend(dotted_files(&package.path.join(PAYLOAD_DIR), true)?);
        Ok(files)
    }

    async fn remove(&self, package: &Package) -> Result<(), PackageError> {
        let path = package.path.clone();
        blocking(move || Ok(std::fs::remove_dir_all(path)?)).await?;
        tracing::info!(package = %package.name, path = %package.path.display(), "Removed package");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipe_writer_domain::manifest;
    use tempfile::TempDir;

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn setup() -> (TempDir, FsPackageStore) {
        let dir = TempDir::new().unwrap();
        let store = FsPackageStore::new(dir.path());
        (dir, store)
    }

    fn make_dir(store: &FsPackageStore, task_id: &str, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let path = store.package_path(task_id, name);
        std::fs::create_dir_all(&path).unwrap();
        for (file, content) in files {
            std::fs::write(path.join(file), content).unwrap();
        }
        path
    }

    #[tokio::test]
    async fn test_create_moves_payload_and_writes_manifests() {
        let (_dir, store) = setup();
        let path = make_dir(&store, "t1", "bag1", &[("001.tif", "hello"), ("notes.txt", "n")]);

        let package = store.create(&path).await.unwrap();

        assert!(path.join("bagit.txt").is_file());
        assert!(path.join("data/001.tif").is_file());
        assert!(!path.join("001.tif").exists());
        assert!(!path.join(STAGING_DIR).exists());

        assert_eq!(package.name, "bag1");
        assert_eq!(package.info[OXUM_KEY], "6.2");
        let algorithms: Vec<_> = package.manifests.iter().map(|m| m.algorithm.as_str()).collect();
        assert_eq!(algorithms, vec!["md5", "sha256"]);

        let entries = manifest::merge(&package.manifests, "tif").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "data/001.tif");
        assert_eq!(entries[0].checksums["md5"], HELLO_MD5);
        assert_eq!(entries[0].checksums["sha256"], HELLO_SHA256);
    }

    #[tokio::test]
    async fn test_create_with_single_algorithm() {
        let (_dir, store) = setup();
        let store = store.with_algorithms(vec![ChecksumAlgorithm::Md5]);
        let path = make_dir(&store, "t1", "bag1", &[("001.tif", "hello")]);

        let package = store.create(&path).await.unwrap();

        assert!(path.join("manifest-md5.txt").is_file());
        assert!(path.join("tagmanifest-md5.txt").is_file());
        assert!(!path.join("manifest-sha256.txt").exists());
        assert_eq!(package.manifests.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_creates_on_blocking_pool() {
        let (_dir, store) = setup();
        let first = make_dir(&store, "t1", "bag1", &[("001.tif", "hello")]);
        let second = make_dir(&store, "t1", "bag2", &[("001.tif", "hello")]);

        let (a, b) = tokio::join!(store.create(&first), store.create(&second));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!((a.name.as_str(), b.name.as_str()), ("bag1", "bag2"));
        for package in [&a, &b] {
            let entries = manifest::merge(&package.manifests, "tif").unwrap();
            assert_eq!(entries[0].checksums["md5"], HELLO_MD5);
            assert_eq!(entries[0].checksums["sha256"], HELLO_SHA256);
        }
    }

    #[tokio::test]
    async fn test_open_plain_directory_is_not_a_package() {
        let (_dir, store) = setup();
        let path = make_dir(&store, "t1", "plain", &[("001.tif", "x")]);

        let result = store.open(&path).await;

        assert!(matches!(result, Err(PackageError::NotAPackage(_))));
    }

    #[tokio::test]
    async fn test_open_missing_directory() {
        let (dir, store) = setup();

        let result = store.open(&dir.path().join("missing")).await;

        assert!(matches!(result, Err(PackageError::Io(_))));
    }

    #[tokio::test]
    async fn test_save_stamps_info_and_covers_tag_files() {
        let (_dir, store) = setup();
        let path = make_dir(&store, "t1", "bag1", &[("001.tif", "hello")]);
        let mut package = store.create(&path).await.unwrap();

        package
            .info
            .insert(Package::DESCRIPTION_KEY.to_string(), "Described".to_string());
        store.write_file(&package, "bag1.json", b"{}").await.unwrap();
        let saved = store.save(&package, false).await.unwrap();

        assert_eq!(saved.name, "Described");
        let info = std::fs::read_to_string(path.join("bag-info.txt")).unwrap();
        assert!(info.contains("External-Description: Described\n"));

        let tags = std::fs::read_to_string(path.join("tagmanifest-md5.txt")).unwrap();
        assert!(tags.contains("  bag1.json\n"));
        assert!(tags.contains("  bag-info.txt\n"));
        assert!(tags.contains("  manifest-sha256.txt\n"));
        assert!(!tags.contains("tagmanifest"));
        assert!(!tags.contains("data/"));
    }

    #[tokio::test]
    async fn test_save_regenerates_payload_manifests() {
        let (_dir, store) = setup();
        let path = make_dir(&store, "t1", "bag1", &[("001.tif", "hello")]);
        let package = store.create(&path).await.unwrap();

        std::fs::write(path.join("data/002.tif"), "hello").unwrap();

        let unchanged = store.save(&package, false).await.unwrap();
        assert_eq!(manifest::merge(&unchanged.manifests, "tif").unwrap().len(), 1);

        let updated = store.save(&package, true).await.unwrap();
        assert_eq!(manifest::merge(&updated.manifests, "tif").unwrap().len(), 2);
        assert_eq!(updated.info[OXUM_KEY], "10.2");
    }

    #[tokio::test]
    async fn test_derivative_dirs_sorted_directories_only() {
        let (_dir, store) = setup();
        make_dir(&store, "t1", "b", &[]);
        make_dir(&store, "t1", "a", &[]);
        std::fs::write(store.derivative_area("t1").join("stray.txt"), "x").unwrap();

        let dirs = store.derivative_dirs("t1").await.unwrap();
        let names: Vec<_> = dirs
            .iter()
            .map(|d| d.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_derivative_dirs_missing_area() {
        let (_dir, store) = setup();
        assert!(store.derivative_dirs("unknown").await.is_err());
    }

    #[tokio::test]
    async fn test_upload_files() {
        let (_dir, store) = setup();
        let path = make_dir(&store, "t1", "bag1", &[("001.tif", "a"), ("README", "b")]);
        let package = store.create(&path).await.unwrap();
        std::fs::create_dir(path.join("data/sub.d")).unwrap();

        let files = store.upload_files(&package).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| (relative_name(&path, &f.local_path), f.in_payload))
            .collect();

        assert!(names.contains(&("bagit.txt".to_string(), false)));
        assert!(names.contains(&("manifest-md5.txt".to_string(), false)));
        assert!(names.contains(&("data/001.tif".to_string(), true)));
        assert!(!names.iter().any(|(n, _)| n == "data/README"));
        assert!(!names.iter().any(|(n, _)| n == "data/sub.d"));
    }

    #[tokio::test]
    async fn test_write_file_rejects_paths() {
        let (_dir, store) = setup();
        let path = make_dir(&store, "t1", "bag1", &[("001.tif", "a")]);
        let package = store.create(&path).await.unwrap();

        let result = store.write_file(&package, "../escape.json", b"x").await;

        assert!(matches!(result, Err(PackageError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_remove() {
        let (_dir, store) = setup();
        let path = make_dir(&store, "t1", "bag1", &[("001.tif", "a")]);
        let package = store.create(&path).await.unwrap();

        store.remove(&package).await.unwrap();

        assert!(!path.exists());
    }

    #[test]
    fn test_parse_info_continuation_lines() {
        let info = parse_info("Source-Organization: OU\nExternal-Description: A long\n  description\n\n");

        assert_eq!(info["Source-Organization"], "OU");
        assert_eq!(info["External-Description"], "A long description");
    }
}
