// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role and permission checks used by extractors and middleware.

use super::Role;

/// True when `held` contains every entry of `required`.
pub fn check_permissions<S: AsRef<str>>(required: &[&str], held: &[S]) -> bool {
    if required.is_empty() {
        return true;
    }
    if held.is_empty() {
        return false;
    }
    required
        .iter()
        .all(|perm| held.iter().any(|h| h.as_ref() == *perm))
}

/// Required permissions absent from `held`, in declaration order.
pub fn missing_permissions<S: AsRef<str>>(required: &[&str], held: &[S]) -> Vec<String> {
    required
        .iter()
        .filter(|perm| !held.iter().any(|h| h.as_ref() == **perm))
        .map(|perm| perm.to_string())
        .collect()
}

/// True when any held role grants `required`.
pub fn check_role(required: Role, held: &[Role]) -> bool {
    held.iter().any(|role| role.has_privilege(required))
}
