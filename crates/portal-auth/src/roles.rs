//! Role membership gate for privileged routes.

use std::collections::BTreeSet;

/// Whether any of `roles` is in the `privileged` set.
///
/// Role names compare exactly; `admin` does not match `ADMIN`.
pub fn has_admin_role<'a, I>(roles: I, privileged: &BTreeSet<String>) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    roles.into_iter().any(|role| privileged.contains(role))
}
