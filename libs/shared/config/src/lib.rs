use std::env;

use chrono_tz::Tz;
use tracing::warn;

/// Fallback when OPERATIONAL_TIMEZONE is unset or unparseable. All
/// wall-clock input from clients is interpreted in this single zone.
pub const DEFAULT_OPERATIONAL_TIMEZONE: Tz = chrono_tz::America::New_York;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub operational_timezone: Tz,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            operational_timezone: env::var("OPERATIONAL_TIMEZONE")
                .ok()
                .and_then(|name| match name.parse::<Tz>() {
                    Ok(tz) => Some(tz),
                    Err(_) => {
                        warn!(
                            "OPERATIONAL_TIMEZONE {:?} is not a valid IANA zone, using default",
                            name
                        );
                        None
                    }
                })
                .unwrap_or(DEFAULT_OPERATIONAL_TIMEZONE),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }
}
