//! In-memory collaborators and a scratch installation for unit tests
//!
//! Every fake shares its state through an `Rc<RefCell<_>>` handle so a test
//! can script failures and inspect calls after handing the fake to a `Host`.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::backup::archive::{archive_tree, sha256_file, Exclusions};
use crate::backup::{BackupManager, RestoreEngine, RetentionPolicy, SnapshotStore};
use crate::config::{Settings, StewardPaths};
use crate::credentials::{CredentialContext, DbConnection, GeneratedCredentials};
use crate::error::{StewardError, StewardResult};
use crate::lifecycle::{InterruptGuard, Orchestrator};
use crate::models::snapshot::{
    CONFIG_DIR, DATABASE_DIR, METADATA_FILE, METADATA_FORMAT_VERSION, TREE_ARCHIVE,
};
use crate::models::{
    AppConfig, Checksums, DatabaseSection, Installation, PayloadSizes, SnapshotId, SnapshotKind,
    SnapshotMetadata,
};
use crate::storage::file_io::write_json_atomic;
use crate::system::{
    Database, Hardener, HealthProbe, Host, PackageProvider, Release, SchemaMigrator,
    ServiceAccount, ServiceAccounts, ServiceManager, ServiceStatus,
};
use crate::version::Version;

/// Password stored in the scratch installation's config
pub const DB_PASSWORD: &str = "Correct-Horse-42-Battery";

fn scripted(tool: &str) -> StewardError {
    StewardError::tool(tool, "exit status: 1", PathBuf::from(format!("/tmp/{}.log", tool)))
}

// ---- database ----------------------------------------------------------

#[derive(Debug, Default)]
pub struct DbState {
    pub exists: bool,
    /// Table name to row count; the dump is this map as JSON
    pub tables: BTreeMap<String, u64>,
    pub fail_dump: bool,
    pub fail_recreate: bool,
    pub fail_load: bool,
    pub fail_destroy: bool,
    /// Whether interrupts were being ignored when `destroy` ran
    pub destroy_shielded: Option<bool>,
    pub calls: Vec<String>,
}

pub struct FakeDatabase(Rc<RefCell<DbState>>);

impl FakeDatabase {
    pub fn new() -> (Self, Rc<RefCell<DbState>>) {
        let state = Rc::new(RefCell::new(DbState::default()));
        (Self(state.clone()), state)
    }
}

impl Database for FakeDatabase {
    fn provision(&self, _conn: &DbConnection) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push("provision".into());
        s.exists = true;
        Ok(())
    }

    fn dump(&self, _conn: &DbConnection, _account: &ServiceAccount, dest: &Path) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push("dump".into());
        if s.fail_dump {
            return Err(scripted("pg_dump"));
        }
        fs::write(dest, serde_json::to_vec(&s.tables)?)?;
        Ok(())
    }

    fn recreate(&self, _conn: &DbConnection) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push("recreate".into());
        if s.fail_recreate {
            return Err(scripted("psql"));
        }
        s.tables.clear();
        s.exists = true;
        Ok(())
    }

    fn load(&self, _conn: &DbConnection, _account: &ServiceAccount, dump: &Path) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push("load".into());
        if s.fail_load {
            return Err(scripted("psql"));
        }
        s.tables = serde_json::from_slice(&fs::read(dump)?)?;
        Ok(())
    }

    fn destroy(&self, _conn: &DbConnection) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push("destroy".into());
        s.destroy_shielded = Some(InterruptGuard::is_engaged());
        if s.fail_destroy {
            return Err(scripted("psql"));
        }
        s.exists = false;
        s.tables.clear();
        Ok(())
    }
}

// ---- services ----------------------------------------------------------

#[derive(Debug, Default)]
pub struct ServiceState {
    pub active: BTreeSet<String>,
    pub enabled: BTreeSet<String>,
    pub units: BTreeSet<String>,
    /// Services that accept `start` but never report active
    pub never_active: BTreeSet<String>,
    pub fail_start: bool,
    pub calls: Vec<String>,
    /// Number of `statuses` rounds
    pub status_queries: u32,
}

pub struct FakeServices(Rc<RefCell<ServiceState>>);

impl FakeServices {
    pub fn new() -> (Self, Rc<RefCell<ServiceState>>) {
        let state = Rc::new(RefCell::new(ServiceState::default()));
        (Self(state.clone()), state)
    }
}

impl ServiceManager for FakeServices {
    fn start(&self, name: &str) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push(format!("start {}", name));
        if s.fail_start {
            return Err(scripted("systemctl"));
        }
        if !s.never_active.contains(name) {
            s.active.insert(name.to_string());
        }
        Ok(())
    }

    fn stop(&self, name: &str) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push(format!("stop {}", name));
        s.active.remove(name);
        Ok(())
    }

    fn is_active(&self, name: &str) -> StewardResult<bool> {
        Ok(self.0.borrow().active.contains(name))
    }

    fn enable(&self, name: &str) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push(format!("enable {}", name));
        s.units.insert(name.to_string());
        s.enabled.insert(name.to_string());
        Ok(())
    }

    fn disable(&self, name: &str) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push(format!("disable {}", name));
        s.enabled.remove(name);
        Ok(())
    }

    fn remove_unit(&self, name: &str) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        s.calls.push(format!("remove-unit {}", name));
        s.units.remove(name);
        Ok(())
    }

    fn statuses(&self, names: &[String]) -> Vec<ServiceStatus> {
        let mut s = self.0.borrow_mut();
        s.status_queries += 1;
        names
            .iter()
            .map(|name| ServiceStatus {
                name: name.clone(),
                active: s.active.contains(name),
            })
            .collect()
    }
}

// ---- packages ----------------------------------------------------------

#[derive(Debug, Default)]
pub struct PackageState {
    pub release: Option<Release>,
    pub fail_dependencies: bool,
    pub dependency_runs: u32,
    pub fail_rebuild: bool,
    pub rebuild_runs: u32,
}

pub struct FakePackages(Rc<RefCell<PackageState>>);

impl FakePackages {
    pub fn new() -> (Self, Rc<RefCell<PackageState>>) {
        let state = Rc::new(RefCell::new(PackageState::default()));
        (Self(state.clone()), state)
    }
}

impl PackageProvider for FakePackages {
    fn fetch(&self, requested: Option<&Version>) -> StewardResult<Release> {
        let s = self.0.borrow();
        let release = s
            .release
            .clone()
            .ok_or_else(|| StewardError::Precondition("No release staged".into()))?;
        match requested {
            Some(v) if *v != release.version => Err(StewardError::Precondition(format!(
                "Bundle holds {}, not {}",
                release.version, v
            ))),
            _ => Ok(release),
        }
    }

    fn install_dependencies(
        &self,
        release: &Release,
        root: &Path,
        _account: &ServiceAccount,
    ) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        if s.fail_dependencies {
            return Err(scripted("pip"));
        }
        s.dependency_runs += 1;
        fs::create_dir_all(root.join("venv/bin"))?;
        fs::write(root.join("venv/bin/python"), format!("deps for {}", release.version))?;
        Ok(())
    }

    /// Builds the venv for whatever `RELEASE` the tree carries
    fn rebuild_dependencies(&self, root: &Path, _account: &ServiceAccount) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        if s.fail_rebuild {
            return Err(scripted("pip"));
        }
        s.rebuild_runs += 1;
        let release = fs::read_to_string(root.join("RELEASE"))
            .unwrap_or_else(|_| "unversioned tree".to_string());
        fs::create_dir_all(root.join("venv/bin"))?;
        fs::write(root.join("venv/bin/python"), format!("deps for {}", release))?;
        Ok(())
    }
}

// ---- migrator, hardener, probe -----------------------------------------

#[derive(Debug, Default)]
pub struct StepState {
    pub runs: u32,
    pub fail: bool,
}

pub struct FakeMigrator(Rc<RefCell<StepState>>);

impl FakeMigrator {
    pub fn new() -> (Self, Rc<RefCell<StepState>>) {
        let state = Rc::new(RefCell::new(StepState::default()));
        (Self(state.clone()), state)
    }
}

impl SchemaMigrator for FakeMigrator {
    fn migrate(&self, _root: &Path, _account: &ServiceAccount) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        s.runs += 1;
        if s.fail {
            return Err(scripted("migrate"));
        }
        Ok(())
    }
}

pub struct FakeHardener(Rc<RefCell<StepState>>);

impl FakeHardener {
    pub fn new() -> (Self, Rc<RefCell<StepState>>) {
        let state = Rc::new(RefCell::new(StepState::default()));
        (Self(state.clone()), state)
    }
}

impl Hardener for FakeHardener {
    fn harden(&self, _root: &Path, _account: &ServiceAccount) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        s.runs += 1;
        if s.fail {
            return Err(scripted("restorecon"));
        }
        Ok(())
    }
}

pub struct FakeProbe(Rc<RefCell<StepState>>);

impl FakeProbe {
    pub fn new() -> (Self, Rc<RefCell<StepState>>) {
        let state = Rc::new(RefCell::new(StepState::default()));
        (Self(state.clone()), state)
    }
}

impl HealthProbe for FakeProbe {
    fn check(&self, url: &str) -> StewardResult<()> {
        let mut s = self.0.borrow_mut();
        s.runs += 1;
        if s.fail {
            return Err(StewardError::Io(format!("connection refused: {}", url)));
        }
        Ok(())
    }
}

// ---- accounts ----------------------------------------------------------

#[derive(Debug, Default)]
pub struct AccountState {
    pub exists: bool,
    pub home: PathBuf,
}

/// Resolves the configured name to the uid/gid running the tests
pub struct FakeAccounts(Rc<RefCell<AccountState>>);

impl FakeAccounts {
    pub fn new() -> (Self, Rc<RefCell<AccountState>>) {
        let state = Rc::new(RefCell::new(AccountState::default()));
        (Self(state.clone()), state)
    }
}

impl ServiceAccounts for FakeAccounts {
    fn lookup(&self, name: &str) -> StewardResult<Option<ServiceAccount>> {
        let s = self.0.borrow();
        Ok(s.exists.then(|| ServiceAccount {
            name: name.to_string(),
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            home: s.home.clone(),
        }))
    }

    fn ensure(&self, name: &str, home: &Path) -> StewardResult<ServiceAccount> {
        {
            let mut s = self.0.borrow_mut();
            s.exists = true;
            s.home = home.to_path_buf();
        }
        self.require(name)
    }

    fn remove(&self, _name: &str) -> StewardResult<()> {
        self.0.borrow_mut().exists = false;
        Ok(())
    }
}

// ---- test bed ----------------------------------------------------------

/// A scratch host: state directory, install root and fake collaborators
pub struct TestBed {
    pub temp: TempDir,
    pub paths: StewardPaths,
    pub settings: Settings,
    pub installation: Installation,
    pub store: SnapshotStore,
    pub host: Host,
    pub db: Rc<RefCell<DbState>>,
    pub services: Rc<RefCell<ServiceState>>,
    pub packages: Rc<RefCell<PackageState>>,
    pub migrator: Rc<RefCell<StepState>>,
    pub accounts: Rc<RefCell<AccountState>>,
    pub hardener: Rc<RefCell<StepState>>,
    pub probe: Rc<RefCell<StepState>>,
}

impl TestBed {
    /// Nothing installed yet
    pub fn empty() -> Self {
        let temp = TempDir::new().unwrap();
        let paths = StewardPaths::with_base_dir(temp.path().join("state"));

        let mut settings = Settings::default();
        settings.app.install_root = temp.path().join("opt/webapp");
        settings.preflight.require_root = false;
        settings.preflight.min_free_mb = 0;
        settings.preflight.supported_os.clear();
        settings.health.attempts = 3;
        settings.health.interval_ms = 0;
        settings.hardening.selinux_relabel = false;

        let (services, services_state) = FakeServices::new();
        let (database, db_state) = FakeDatabase::new();
        let (packages, packages_state) = FakePackages::new();
        let (migrator, migrator_state) = FakeMigrator::new();
        let (accounts, accounts_state) = FakeAccounts::new();
        let (hardener, hardener_state) = FakeHardener::new();
        let (probe, probe_state) = FakeProbe::new();

        let host = Host {
            services: Box::new(services),
            database: Box::new(database),
            packages: Box::new(packages),
            migrator: Box::new(migrator),
            accounts: Box::new(accounts),
            hardener: Box::new(hardener),
            probe: Box::new(probe),
            credentials: Box::new(GeneratedCredentials),
        };

        Self {
            installation: Installation::from_settings(&settings),
            store: SnapshotStore::new(paths.snapshot_dir()),
            temp,
            paths,
            settings,
            host,
            db: db_state,
            services: services_state,
            packages: packages_state,
            migrator: migrator_state,
            accounts: accounts_state,
            hardener: hardener_state,
            probe: probe_state,
        }
    }

    /// A running installation of `version`
    pub fn installed(version: &str) -> Self {
        let bed = Self::empty();
        let root = &bed.installation.root;
        for (rel, contents) in [
            ("app/views.py", "def index(): pass\n"),
            ("app/static/site.css", "body {}\n"),
            ("manage.py", "#!/usr/bin/env python\n"),
            ("venv/bin/python", "interpreter"),
        ] {
            let path = root.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        AppConfig {
            database: DatabaseSection {
                host: "127.0.0.1".into(),
                port: 5432,
                name: "webapp".into(),
                user: "webapp".into(),
                password: Some(DB_PASSWORD.into()),
            },
            secret_key: Some("k".repeat(50)),
            allowed_hosts: vec!["localhost".into()],
            extra: BTreeMap::new(),
        }
        .save(&bed.installation.config_file)
        .unwrap();
        bed.installation
            .write_marker(&Version::parse(version).unwrap())
            .unwrap();

        {
            let mut accounts = bed.accounts.borrow_mut();
            accounts.exists = true;
            accounts.home = root.clone();
        }
        {
            let mut db = bed.db.borrow_mut();
            db.exists = true;
            db.tables.insert("auth_user".into(), 3);
        }
        {
            let mut services = bed.services.borrow_mut();
            for name in &bed.installation.services {
                services.units.insert(name.clone());
                services.enabled.insert(name.clone());
                services.active.insert(name.clone());
            }
        }
        bed
    }

    pub fn credentials(&self) -> CredentialContext {
        CredentialContext::from_config(
            &self.installation.load_config().unwrap(),
            self.host.credentials.as_ref(),
        )
        .unwrap()
    }

    pub fn backup_manager(&self) -> BackupManager<'_> {
        BackupManager::new(
            &self.installation,
            &self.store,
            RetentionPolicy::from(&self.settings.retention),
            Exclusions::new(&self.settings.archive.exclude),
            &self.host,
        )
    }

    pub fn restore_engine(&self) -> RestoreEngine<'_> {
        RestoreEngine::new(
            &self.installation,
            &self.host,
            &self.settings.health,
        )
    }

    pub fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(&self.paths, &self.settings, &self.host)
    }

    /// Build a release tree for `version` and make it the bundle's release
    pub fn stage_release(&self, version: &str) -> Version {
        let version = Version::parse(version).unwrap();
        let source = self.temp.path().join(format!("release-{}", version));
        for (rel, contents) in [
            ("app/views.py", format!("# release {}\ndef index(): pass\n", version)),
            ("app/static/site.css", "body {}\n".to_string()),
            ("manage.py", "#!/usr/bin/env python\n".to_string()),
            ("RELEASE", version.to_string()),
        ] {
            let path = source.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }
        let archive = self.temp.path().join(format!("webapp-{}.tar.gz", version));
        archive_tree(&source, &archive, &Exclusions::default()).unwrap();

        self.packages.borrow_mut().release = Some(Release {
            version: version.clone(),
            tree_archive: archive,
            dependency_dir: None,
        });
        version
    }
}

/// 2026-05-01 12:`m`:00 UTC
pub fn minute(m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 12, m, 0).unwrap()
}

/// Write a complete snapshot with small payloads directly into the store
pub fn seed_snapshot(store: &SnapshotStore, at: DateTime<Utc>, kind: SnapshotKind) -> SnapshotId {
    store.ensure_root().unwrap();
    let id = store.allocate_id(at, kind);
    let dir = store.snapshot_path(&id);
    fs::create_dir_all(dir.join(CONFIG_DIR)).unwrap();
    fs::create_dir_all(dir.join(DATABASE_DIR)).unwrap();

    let config = dir.join(CONFIG_DIR).join("settings.yaml");
    let dump = dir.join(DATABASE_DIR).join("webapp.sql.gz");
    let tree = dir.join(TREE_ARCHIVE);
    fs::write(&config, "database: {name: webapp, user: webapp}\n").unwrap();
    fs::write(&dump, "{}").unwrap();
    fs::write(&tree, format!("tree of {}", id)).unwrap();

    let metadata = SnapshotMetadata {
        format_version: METADATA_FORMAT_VERSION,
        id: id.clone(),
        kind,
        created_at: at,
        source_version: "1.0.0".into(),
        config_file: "settings.yaml".into(),
        database_dump: "webapp.sql.gz".into(),
        checksums: Checksums {
            config: sha256_file(&config).unwrap(),
            database: sha256_file(&dump).unwrap(),
            tree: sha256_file(&tree).unwrap(),
        },
        sizes: PayloadSizes {
            config: 39,
            database: 2,
            tree: 30,
        },
    };
    write_json_atomic(dir.join(METADATA_FILE), &metadata).unwrap();
    id
}

/// Relative paths of every file under `root`
pub fn tree_files(root: &Path) -> BTreeSet<String> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().to_string())
        })
        .collect()
}
