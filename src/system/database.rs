//! The application database
//!
//! Administrative statements (create/drop role and database) run as the
//! database server's OS superuser with SQL fed over stdin, so no secret ever
//! appears in a process argument list. Dumps and loads run as the service
//! account over the IPv4 loopback with a short-lived password file.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info, warn};

use super::accounts::ServiceAccount;
use super::runner::{as_account, ToolRunner};
use crate::credentials::DbConnection;
use crate::error::{StewardError, StewardResult};

/// Operations on the application's relational database
pub trait Database {
    /// Create the login role and an empty database it owns
    fn provision(&self, conn: &DbConnection) -> StewardResult<()>;

    /// Write a gzip-compressed logical dump to `dest`
    fn dump(&self, conn: &DbConnection, account: &ServiceAccount, dest: &Path)
        -> StewardResult<()>;

    /// Drop the database and recreate it empty, owned by the application role
    fn recreate(&self, conn: &DbConnection) -> StewardResult<()>;

    /// Load a dump produced by `dump` into the (empty) database
    fn load(&self, conn: &DbConnection, account: &ServiceAccount, dump: &Path)
        -> StewardResult<()>;

    /// Drop the database and the application role; absent objects are fine
    fn destroy(&self, conn: &DbConnection) -> StewardResult<()>;
}

/// Quote an SQL identifier
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Escape a field for a libpq password file
fn pgpass_field(value: &str) -> String {
    value.replace('\\', "\\\\").replace(':', "\\:")
}

/// A libpq password file that exists only while this value lives
///
/// Created with mode 0600 and owned by the account that will read it;
/// removed on drop whether or not the command using it succeeded.
pub struct PasswordFile {
    path: PathBuf,
}

impl PasswordFile {
    pub fn create(dir: &Path, conn: &DbConnection, owner: &ServiceAccount) -> StewardResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(".pgpass-{}", uuid::Uuid::new_v4()));

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
            .map_err(|e| StewardError::Io(format!("Failed to create password file: {}", e)))?;
        let guard = Self { path };

        writeln!(
            file,
            "{}:{}:{}:{}:{}",
            pgpass_field(conn.connect_host()),
            conn.port,
            pgpass_field(&conn.name),
            pgpass_field(&conn.user),
            pgpass_field(&conn.password)
        )?;
        file.sync_all()?;

        if nix::unistd::Uid::effective().is_root() {
            nix::unistd::chown(
                &guard.path,
                Some(nix::unistd::Uid::from_raw(owner.uid)),
                Some(nix::unistd::Gid::from_raw(owner.gid)),
            )?;
        }
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PasswordFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), "Failed to remove password file: {}", e);
        }
    }
}

/// PostgreSQL through `psql` and `pg_dump`
#[derive(Debug, Clone)]
pub struct Postgres {
    runner: ToolRunner,
    /// OS account allowed to administer the server
    superuser: String,
    /// Where short-lived password files are written
    scratch_dir: PathBuf,
}

impl Postgres {
    pub fn new(runner: ToolRunner, superuser: impl Into<String>, scratch_dir: PathBuf) -> Self {
        Self {
            runner,
            superuser: superuser.into(),
            scratch_dir,
        }
    }

    fn superuser_account(&self) -> StewardResult<ServiceAccount> {
        ServiceAccount::lookup(&self.superuser)?.ok_or_else(|| {
            StewardError::Precondition(format!(
                "Database superuser account '{}' does not exist",
                self.superuser
            ))
        })
    }

    /// Run administrative SQL as the superuser over the local socket
    fn admin_sql(&self, sql: &str) -> StewardResult<()> {
        let account = self.superuser_account()?;
        let mut cmd = Command::new("psql");
        cmd.args(["--no-psqlrc", "-v", "ON_ERROR_STOP=1", "-d", "postgres"]);
        as_account(&mut cmd, &account);
        let mut input = sql.as_bytes();
        self.runner.run_with_input("psql", &mut cmd, &mut input)
    }

    /// Connection arguments forcing the numeric loopback address
    fn client_command(&self, program: &str, conn: &DbConnection, pgpass: &PasswordFile) -> Command {
        let mut cmd = Command::new(program);
        cmd.arg("-h")
            .arg(conn.connect_host())
            .arg("-p")
            .arg(conn.port.to_string())
            .arg("-U")
            .arg(&conn.user)
            .arg("-d")
            .arg(&conn.name)
            .env("PGPASSFILE", pgpass.path())
            .env_remove("PGPASSWORD");
        cmd
    }
}

impl Database for Postgres {
    fn provision(&self, conn: &DbConnection) -> StewardResult<()> {
        info!(database = %conn.name, user = %conn.user, "Provisioning database");
        let role = quote_ident(&conn.user);
        let sql = format!(
            "DO $$ BEGIN\n\
             IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname = {user_lit}) THEN\n\
               CREATE ROLE {role} LOGIN;\n\
             END IF;\n\
             END $$;\n\
             ALTER ROLE {role} WITH LOGIN PASSWORD {password};\n\
             CREATE DATABASE {db} OWNER {role};\n",
            user_lit = quote_literal(&conn.user),
            role = role,
            password = quote_literal(&conn.password),
            db = quote_ident(&conn.name),
        );
        self.admin_sql(&sql)
    }

    fn dump(
        &self,
        conn: &DbConnection,
        account: &ServiceAccount,
        dest: &Path,
    ) -> StewardResult<()> {
        info!(database = %conn.name, dest = %dest.display(), "Dumping database");
        let pgpass = PasswordFile::create(&self.scratch_dir, conn, account)?;

        let mut cmd = self.client_command("pg_dump", conn, &pgpass);
        cmd.args(["--no-password", "--clean", "--if-exists"]);
        as_account(&mut cmd, account);

        let file = File::create(dest)
            .map_err(|e| StewardError::Io(format!("Failed to create dump file: {}", e)))?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        self.runner.run_to_writer("pg_dump", &mut cmd, &mut encoder)?;

        let mut writer = encoder.finish()?;
        writer.flush()?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| StewardError::Io(format!("Failed to sync dump file: {}", e)))?;
        Ok(())
    }

    fn recreate(&self, conn: &DbConnection) -> StewardResult<()> {
        info!(database = %conn.name, "Dropping and recreating database");
        let sql = format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = {lit} AND pid <> pg_backend_pid();\n\
             DROP DATABASE IF EXISTS {db};\n\
             CREATE DATABASE {db} OWNER {role};\n",
            lit = quote_literal(&conn.name),
            db = quote_ident(&conn.name),
            role = quote_ident(&conn.user),
        );
        self.admin_sql(&sql)
    }

    fn load(
        &self,
        conn: &DbConnection,
        account: &ServiceAccount,
        dump: &Path,
    ) -> StewardResult<()> {
        info!(database = %conn.name, dump = %dump.display(), "Loading database dump");
        let pgpass = PasswordFile::create(&self.scratch_dir, conn, account)?;

        let mut cmd = self.client_command("psql", conn, &pgpass);
        cmd.args(["--no-password", "--no-psqlrc", "-v", "ON_ERROR_STOP=1", "-q"]);
        as_account(&mut cmd, account);

        let file = File::open(dump)
            .map_err(|e| StewardError::Io(format!("Failed to open dump {}: {}", dump.display(), e)))?;
        let mut decoder = GzDecoder::new(BufReader::new(file));
        let result = self.runner.run_with_input("psql", &mut cmd, &mut decoder);
        drop(pgpass);
        debug!("Password file removed after load");
        result
    }

    fn destroy(&self, conn: &DbConnection) -> StewardResult<()> {
        info!(database = %conn.name, user = %conn.user, "Dropping database and role");
        let sql = format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = {lit} AND pid <> pg_backend_pid();\n\
             DROP DATABASE IF EXISTS {db};\n\
             DROP ROLE IF EXISTS {role};\n",
            lit = quote_literal(&conn.name),
            db = quote_ident(&conn.name),
            role = quote_ident(&conn.user),
        );
        self.admin_sql(&sql)
    }
}
