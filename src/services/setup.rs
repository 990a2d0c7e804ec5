//! Account setup.
//! Validates the credentials, authenticates once and stores the resulting entry.
//! A stored entry is reused as long as the configured credentials match it.
use std::sync::LazyLock;

use regex::Regex;
use strum_macros::{Display, EnumString};

use crate::core::entry::{self, ConfigEntry, EntryFile};
use crate::integration::saur::{self, ErrorKind};

static RE_EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid e-mail pattern"));

/// Codes reported to the user when setup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SetupErrorCode {
    CannotConnect,
    InvalidAuth,
    InvalidEmail,
    Required,
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input on '{field}': {code}")]
    InvalidInput {
        field: &'static str,
        code: SetupErrorCode,
    },
    #[error("Setup failed ({code}): {source}")]
    Remote {
        code: SetupErrorCode,
        #[source]
        source: saur::Error,
    },
    #[error("Setup failed (unknown): no section returned by the API")]
    MissingSection,
    #[error("Setup failed (unknown): {0}")]
    Entry(#[from] entry::Error),
}

impl Error {
    pub fn code(&self) -> SetupErrorCode {
        match self {
            Error::InvalidInput { code, .. } | Error::Remote { code, .. } => *code,
            Error::MissingSection | Error::Entry(_) => SetupErrorCode::Unknown,
        }
    }

    fn remote(source: saur::Error) -> Self {
        let code = match source.kind() {
            ErrorKind::Auth => SetupErrorCode::InvalidAuth,
            ErrorKind::TransientNetwork => SetupErrorCode::CannotConnect,
            _ => SetupErrorCode::Unknown,
        };
        Error::Remote { code, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Check the credentials before any remote call.
pub fn validate_input(login: &str, password: &str) -> Result<()> {
    if login.trim().is_empty() {
        return Err(Error::InvalidInput {
            field: "login",
            code: SetupErrorCode::Required,
        });
    }
    if password.is_empty() {
        return Err(Error::InvalidInput {
            field: "password",
            code: SetupErrorCode::Required,
        });
    }
    if !RE_EMAIL.is_match(login.trim()) {
        return Err(Error::InvalidInput {
            field: "base",
            code: SetupErrorCode::InvalidEmail,
        });
    }
    Ok(())
}

/// Authenticate and collect everything the entry needs.
pub async fn setup_entry(saur: &saur::Client, login: &str, password: &str) -> Result<ConfigEntry> {
    let token = saur.authenticate().await.map_err(Error::remote)?;
    let section_id = saur.section_id().await.ok_or(Error::MissingSection)?;
    let meter = saur
        .get_delivery_point()
        .await
        .map_err(Error::remote)?
        .unwrap_or_default();
    // The delivery point request may have renewed the session.
    let token = saur.access_token().await.unwrap_or(token);
    Ok(ConfigEntry {
        login: login.to_string(),
        password: password.to_string(),
        token,
        section_id,
        meter,
    })
}

/// Return the stored entry, running the setup when there is none or the credentials changed.
pub async fn ensure_entry(
    saur: &saur::Client,
    login: &str,
    password: &str,
    file: &EntryFile,
) -> Result<ConfigEntry> {
    validate_input(login, password)?;
    match file.load().await? {
        Some(entry) if !entry.credentials_differ(login, password) => {
            log::info!("Reusing stored entry for section {}", entry.section_id);
            saur.restore_session(entry.token.clone(), &entry.section_id)
                .await;
            Ok(entry)
        }
        previous => {
            let entry = setup_entry(saur, login, password).await?;
            file.save(&entry).await?;
            if previous.is_some() {
                log::info!("reauth_successful: entry of section {} updated", entry.section_id);
            } else {
                log::info!("Created entry for section {}", entry.section_id);
            }
            Ok(entry)
        }
    }
}
