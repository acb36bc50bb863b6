// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod auth;
pub mod cipher;
pub mod google;
pub mod imputation;
pub mod jobs;
pub mod oauth_state;
pub mod users;

pub use auth::{AuthService, LoginRedirect, RejectReason, ValidationOutcome};
pub use cipher::{CipherError, TokenCipher};
pub use google::{GoogleClient, IdentityProvider, ProviderProfile, ProviderTokens};
pub use imputation::{ImputationApi, ImputationClient, SubmittedJob};
pub use jobs::{JobService, RefreshReport};
pub use oauth_state::OAuthStateStore;
pub use users::UserService;
