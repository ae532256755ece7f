// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Application services sitting between the HTTP handlers and storage.

pub mod auth;
