//! # Authentication Module
//!
//! Credential lifecycle for the Google Drive API.
//!
//! ## Overview
//!
//! This module obtains, refreshes and persists the OAuth 2.0 credential used
//! by every remote call. The interactive step is the installed-app flow: a
//! loopback listener on `127.0.0.1`, the consent page in the system browser,
//! and a PKCE-protected code exchange.
//!
//! ## Features
//!
//! - OAuth 2.0 authorization code flow with PKCE and `state` checking
//! - Silent refresh with a fallback to interactive authorization
//! - One persisted credential (`token.json`) written only after success
//! - Auth state event emission

pub mod callback;
pub mod error;
pub mod manager;
pub mod oauth;
pub mod prompt;
pub mod token_store;
pub mod types;

pub use callback::{AuthorizationCode, LoopbackListener};
pub use error::{AuthError, Result};
pub use manager::{AuthFlowController, CredentialProvider, DEFAULT_AUTH_TIMEOUT};
pub use oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
pub use prompt::{AuthorizationPrompt, BrowserPrompt, InteractiveAuthorizer, LoopbackAuthorizer};
pub use token_store::{CredentialStore, DEFAULT_CREDENTIAL_KEY};
pub use types::{Credential, CredentialState, TokenGrant, EXPIRY_BUFFER_SECS};
