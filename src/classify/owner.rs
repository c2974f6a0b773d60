//! uid → username resolution, cached per-process.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::OnceLock;

fn cache() -> &'static Mutex<HashMap<u32, String>> {
    static CACHE: OnceLock<Mutex<HashMap<u32, String>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Resolve `uid` to a username via `getpwuid_r`. Unresolvable uids (and any other failure)
/// yield `__unknown_uid_N__` rather than raising. Dots in the resolved name are replaced with
/// `__` so it's safe as a dynamic field name in the index backend. Results are cached.
pub fn username_from_uid(uid: u32) -> String {
    if let Some(name) = cache().lock().unwrap().get(&uid) {
        return name.clone();
    }
    let name = lookup_uid(uid).unwrap_or_else(|| format!("__unknown_uid_{uid}__"));
    cache().lock().unwrap().insert(uid, name.clone());
    name
}

fn lookup_uid(uid: u32) -> Option<String> {
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0_i8; 4096];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    loop {
        let rc =
            unsafe { libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result) };
        if rc == libc::ERANGE {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        break;
    }

    if result.is_null() {
        return None;
    }
    let name = unsafe { std::ffi::CStr::from_ptr(pwd.pw_name) }
        .to_string_lossy()
        .replace('.', "__");
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolvable_uid_gets_sentinel_token() {
        assert_eq!(username_from_uid(999_999), "__unknown_uid_999999__");
    }

    #[test]
    fn root_resolves_to_a_name() {
        // uid 0 exists on every unix host this crate targets.
        let name = username_from_uid(0);
        assert!(!name.starts_with("__unknown_uid_"));
    }
}
