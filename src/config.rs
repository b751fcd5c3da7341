use crate::auth::LoginCredentials;
use crate::storage::ObjectStore;
use diesel::pg::PgConnection;
use diesel::r2d2::ConnectionManager;
use structopt::StructOpt;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(StructOpt, Debug, Clone)]
pub struct StorageOpts {
    #[structopt(long, env = "COS_SECRET_ID", default_value = "", hide_env_values = true)]
    pub secret_id: String,
    #[structopt(long, env = "COS_SECRET_KEY", default_value = "", hide_env_values = true)]
    pub secret_key: String,
    #[structopt(long, env = "COS_REGION", default_value = "ap-beijing")]
    pub region: String,
    #[structopt(long, env = "COS_BUCKET", default_value = "exam-papers-ladr")]
    pub bucket: String,
}

impl StorageOpts {
    pub fn object_store(&self) -> ObjectStore {
        ObjectStore::new(&self.secret_id, &self.secret_key, &self.region, &self.bucket)
    }
}

#[derive(StructOpt, Debug, Clone)]
pub struct LoginOpts {
    #[structopt(long = "login-username", env = "LOGIN_USERNAME", default_value = "admin")]
    pub username: String,
    #[structopt(
        long = "login-password",
        env = "LOGIN_PASSWORD",
        default_value = "",
        hide_env_values = true
    )]
    pub password: String,
}

impl LoginOpts {
    pub fn credentials(&self) -> LoginCredentials {
        LoginCredentials::new(self.username.as_str(), &self.password)
    }
}

/// Values the handlers read at request time.
#[derive(Clone, Copy, Debug)]
pub struct Settings {
    /// Student the dashboard shows when a request names none.
    pub default_student_id: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            default_student_id: 1,
        }
    }
}

pub fn pool(database_url: &str) -> Result<DbPool, r2d2::Error> {
    DbPool::builder().build(ConnectionManager::new(database_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(StructOpt)]
    struct Cli {
        #[structopt(flatten)]
        storage: StorageOpts,
        #[structopt(flatten)]
        login: LoginOpts,
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::from_iter_safe(&[
            "ladrd",
            "--region",
            "ap-guangzhou",
            "--bucket",
            "papers",
            "--login-username",
            "tutor",
            "--login-password",
            "pw",
        ])
        .unwrap();
        let store = cli.storage.object_store();
        assert_eq!(store.host(), "papers.cos.ap-guangzhou.myqcloud.com");
        assert!(cli.login.credentials().check("tutor", "pw"));
    }
}
