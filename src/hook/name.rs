//! Hook-name derivation
//!
//! A hook name is the dispatch key plugins subscribe to:
//! `{semantic class name}_{method name}` with the method's single leading
//! `_` marker stripped (host method names carry one in the client's
//! internal naming). The semantic class name stays in the key, so two
//! host classes stripping to the same bare method name never collide.

/// Derives the dispatch key for a hooked method.
pub fn hook_name(semantic: &str, method: &str) -> String {
    let bare = method.strip_prefix('_').unwrap_or(method);
    format!("{}_{}", semantic, bare)
}
