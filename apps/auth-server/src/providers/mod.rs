// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! External identity provider clients.

pub mod auth0;

pub use auth0::{Auth0Client, IdentityError, UserProfile};
