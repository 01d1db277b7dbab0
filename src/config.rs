use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub dir: String,
    pub public_prefix: String,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub sendgrid_api_key: Option<String>,
    pub from: String,
    pub reset_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub app_env: String,
    pub app_base_url: String,
    pub jwt: JwtConfig,
    pub uploads: UploadConfig,
    pub storage: StorageBackend,
    pub s3: Option<S3Config>,
    pub mail: MailConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let secret = std::env::var("JWT_SECRET")?;
        let jwt = JwtConfig {
            refresh_secret: std::env::var("JWT_REFRESH_SECRET").unwrap_or_else(|_| secret.clone()),
            secret,
            issuer: env_or("JWT_ISSUER", "fitcoach"),
            audience: env_or("JWT_AUDIENCE", "fitcoach-users"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 15),
            refresh_ttl_minutes: env_parse("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
        };

        let uploads = UploadConfig {
            dir: env_or("UPLOAD_DIR", "uploads"),
            public_prefix: env_or("UPLOAD_PUBLIC_PREFIX", "/uploads"),
            max_bytes: env_parse("UPLOAD_MAX_BYTES", 10 * 1024 * 1024),
        };

        let storage = match env_or("STORAGE_BACKEND", "local").to_lowercase().as_str() {
            "local" => StorageBackend::Local,
            "s3" => StorageBackend::S3,
            other => anyhow::bail!("unknown STORAGE_BACKEND {other:?}, expected local or s3"),
        };

        let s3 = match storage {
            StorageBackend::S3 => Some(S3Config {
                endpoint: std::env::var("S3_ENDPOINT")?,
                bucket: std::env::var("S3_BUCKET")?,
                access_key: std::env::var("S3_ACCESS_KEY")?,
                secret_key: std::env::var("S3_SECRET_KEY")?,
                region: env_or("S3_REGION", "us-east-1"),
            }),
            StorageBackend::Local => None,
        };

        let mail = MailConfig {
            sendgrid_api_key: std::env::var("SENDGRID_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            from: env_or("MAIL_FROM", "no-reply@fitcoach.local"),
            reset_ttl_minutes: env_parse("PASSWORD_RESET_TTL_MINUTES", 60),
        };

        Ok(Self {
            database_url,
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
            app_env: env_or("APP_ENV", "production"),
            app_base_url: env_or("APP_BASE_URL", "http://localhost:3000"),
            jwt,
            uploads,
            storage,
            s3,
            mail,
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("development")
    }
}
