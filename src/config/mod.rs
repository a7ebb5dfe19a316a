//! Configuration module for the flood relief backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::errors::AppError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment pre-shared key expected in `x-api-key` (optional)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Lifetime of a sign-in session
    pub session_ttl_hours: i64,
    /// Edge length of a zone grid cell, in degrees
    pub zone_cell_degrees: f64,
    /// The only email allowed to sign up with the admin role
    pub bootstrap_admin_email: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("FLOOD_API_PSK").ok().filter(|s| !s.is_empty());

        let db_path = env::var("FLOOD_DB_PATH")
            .unwrap_or_else(|_| "./data/flood.sqlite".to_string())
            .into();

        let bind_addr = env::var("FLOOD_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid FLOOD_BIND_ADDR format: {}", e)))?;

        let log_level = env::var("FLOOD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let session_ttl_hours = match env::var("FLOOD_SESSION_TTL_HOURS") {
            Ok(raw) => parse_session_ttl(&raw)?,
            Err(_) => 72,
        };

        let zone_cell_degrees: f64 = match env::var("FLOOD_ZONE_CELL_DEGREES") {
            Ok(raw) => raw.parse().map_err(|e| {
                AppError::Internal(format!("Invalid FLOOD_ZONE_CELL_DEGREES: {}", e))
            })?,
            Err(_) => 0.1,
        };
        if zone_cell_degrees.is_nan() || zone_cell_degrees <= 0.0 {
            return Err(AppError::Internal(
                "FLOOD_ZONE_CELL_DEGREES must be positive".to_string(),
            ));
        }

        let bootstrap_admin_email = env::var("FLOOD_BOOTSTRAP_ADMIN_EMAIL")
            .ok()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            session_ttl_hours,
            zone_cell_degrees,
            bootstrap_admin_email,
        })
    }
}

/// Session lifetimes are capped at one year.
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

fn parse_session_ttl(raw: &str) -> Result<i64, AppError> {
    let hours: i64 = raw
        .trim()
        .parse()
        .map_err(|e| AppError::Internal(format!("Invalid FLOOD_SESSION_TTL_HOURS: {}", e)))?;
    if !(1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
        return Err(AppError::Internal(format!(
            "FLOOD_SESSION_TTL_HOURS must be between 1 and {}",
            MAX_SESSION_TTL_HOURS
        )));
    }
    Ok(hours)
}
