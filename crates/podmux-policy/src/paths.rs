// SPDX-License-Identifier: Apache-2.0

//! Secret-path matching for the `secretFileAccess` heuristic.

use regex::Regex;
use std::sync::OnceLock;

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let sources = [
            // (a) credential directories, home-relative or absolute
            r"(^|/)(~/|/root/|/home/[^/]+/)?\.(ssh|aws|gnupg|docker|kube|azure)(/|$)",
            // (b) config subdirs under ~/.config
            r"(^|/)(~/|/root/|/home/[^/]+/)?\.config/(gh|gcloud)(/|$)",
            // (c) known credential dotfiles
            r"(^|/)\.(npmrc|netrc|pypirc)$",
            // (d) .env / .env.*
            r"(^|/)\.env(\.[A-Za-z0-9_.-]+)?$",
        ];
        sources.iter().map(|p| Regex::new(p).expect("valid pattern")).collect()
    })
}

pub fn is_secret_path(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    patterns().iter().any(|re| re.is_match(path))
}
