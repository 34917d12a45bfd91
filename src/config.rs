use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the document store REST endpoint.
    pub base_url: String,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub url_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub vision: VisionConfig,
    pub blobs: BlobConfig,
    pub target_width: u32,
    pub jpeg_quality: u8,
    pub attach_retries: u32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store = StoreConfig {
            base_url: std::env::var("RTDB_BASE_URL")?,
            auth_token: std::env::var("RTDB_AUTH_TOKEN").ok(),
        };
        let vision = VisionConfig {
            api_key: std::env::var("OPENAI_API_KEY")?,
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".into()),
            max_tokens: env_parse("VISION_MAX_TOKENS", 300),
            timeout_secs: env_parse("VISION_TIMEOUT_SECS", 30),
        };
        let blobs = BlobConfig {
            endpoint: std::env::var("S3_ENDPOINT")?,
            bucket: std::env::var("S3_BUCKET")?,
            access_key: std::env::var("S3_ACCESS_KEY")?,
            secret_key: std::env::var("S3_SECRET_KEY")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            url_ttl_secs: env_parse("BLOB_URL_TTL_SECS", 7 * 24 * 3600),
        };
        Ok(Self {
            store,
            vision,
            blobs,
            target_width: env_parse("TARGET_WIDTH", 1200),
            jpeg_quality: env_parse("JPEG_QUALITY", 75),
            attach_retries: env_parse("ATTACH_RETRIES", 3),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
