use std::env;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryBackend {
    Supabase,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub directory_backend: DirectoryBackend,
    /// Extra attempts allowed for a directory read that failed transiently.
    pub directory_retry_attempts: u32,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let supabase_url = env::var("SUPABASE_URL")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            });
        let supabase_anon_key = env::var("SUPABASE_ANON_PUBLIC_KEY")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                String::new()
            });
        let supabase_jwt_secret = env::var("SUPABASE_JWT_SECRET")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_JWT_SECRET not set, using empty value");
                String::new()
            });

        let directory_backend = match env::var("DIRECTORY_BACKEND").ok().as_deref() {
            Some("memory") => DirectoryBackend::Memory,
            Some("supabase") => DirectoryBackend::Supabase,
            Some(other) => {
                warn!("Unknown DIRECTORY_BACKEND '{}', falling back to default", other);
                Self::default_backend(&supabase_url)
            }
            None => Self::default_backend(&supabase_url),
        };

        let directory_retry_attempts = env::var("DIRECTORY_RETRY_ATTEMPTS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(1);

        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_else(|| {
                warn!("SERVER_PORT not set or invalid, using default");
                3000
            });

        let config = Self {
            supabase_url,
            supabase_anon_key,
            supabase_jwt_secret,
            directory_backend,
            directory_retry_attempts,
            server_port,
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    fn default_backend(supabase_url: &str) -> DirectoryBackend {
        if supabase_url.is_empty() {
            DirectoryBackend::Memory
        } else {
            DirectoryBackend::Supabase
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_jwt_secret.is_empty()
            && (self.directory_backend == DirectoryBackend::Memory
                || (!self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: DirectoryBackend, url: &str) -> AppConfig {
        AppConfig {
            supabase_url: url.to_string(),
            supabase_anon_key: "anon".to_string(),
            supabase_jwt_secret: "secret".to_string(),
            directory_backend: backend,
            directory_retry_attempts: 1,
            server_port: 3000,
        }
    }

    #[test]
    fn test_memory_backend_does_not_need_supabase() {
        assert!(config(DirectoryBackend::Memory, "").is_configured());
        assert!(!config(DirectoryBackend::Supabase, "").is_configured());
        assert!(config(DirectoryBackend::Supabase, "http://localhost:54321").is_configured());
    }

    #[test]
    fn test_default_backend_follows_supabase_url() {
        assert_eq!(AppConfig::default_backend(""), DirectoryBackend::Memory);
        assert_eq!(AppConfig::default_backend("http://db"), DirectoryBackend::Supabase);
    }
}
