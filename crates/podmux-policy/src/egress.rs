// SPDX-License-Identifier: Apache-2.0

//! `dataEgress` and `secretEnvInUrl` heuristics over a single pipeline stage.

use regex::Regex;
use std::sync::OnceLock;

const CURL_DATA_FLAGS: &[&str] = &[
    "-d",
    "--data",
    "--data-raw",
    "--data-binary",
    "--data-urlencode",
    "-F",
    "--form",
    "--form-string",
    "-T",
    "--upload-file",
    "--json",
];

const WRITE_METHODS: &[&str] = &["POST", "PUT", "DELETE", "PATCH"];

/// `curl`/`wget` invocations whose flags indicate a data-writing request.
pub fn is_data_egress(exe: &str, args: &[String]) -> bool {
    match exe {
        "curl" => curl_is_egress(args),
        "wget" => wget_is_egress(args),
        _ => false,
    }
}

fn curl_is_egress(args: &[String]) -> bool {
    let mut i = 0;
    while i < args.len() {
        let a = &args[i];

        if CURL_DATA_FLAGS.contains(&a.as_str()) {
            return true;
        }
        if let Some(eq) = a.strip_prefix("--") {
            if let Some((flag, _)) = eq.split_once('=') {
                if CURL_DATA_FLAGS.contains(&format!("--{flag}").as_str()) {
                    return true;
                }
            }
        }

        if a == "-X" || a == "--request" {
            if let Some(method) = args.get(i + 1) {
                if WRITE_METHODS.contains(&method.to_uppercase().as_str()) {
                    return true;
                }
            }
        } else if let Some(compact) = a.strip_prefix("-X") {
            if !compact.is_empty() && WRITE_METHODS.contains(&compact.to_uppercase().as_str()) {
                return true;
            }
        }
        i += 1;
    }
    false
}

fn wget_is_egress(args: &[String]) -> bool {
    args.iter().any(|a| {
        a == "--post-data"
            || a == "--post-file"
            || a.starts_with("--post-data=")
            || a.starts_with("--post-file=")
    })
}

/// `curl`/`wget` args referencing `${NAME}`/`$NAME` env vars whose uppercased
/// name contains a secret-suggestive keyword, inside an `http(s)://` URL arg.
pub fn is_secret_env_in_url(exe: &str, args: &[String]) -> bool {
    if exe != "curl" && exe != "wget" {
        return false;
    }
    args.iter().any(|a| contains_secret_env_reference(a))
}

fn contains_secret_env_reference(arg: &str) -> bool {
    if !url_pattern().is_match(arg) {
        return false;
    }
    env_ref_pattern()
        .captures_iter(arg)
        .any(|cap| {
            let name = cap.get(1).or_else(|| cap.get(2)).map(|m| m.as_str()).unwrap_or("");
            let upper = name.to_uppercase();
            SECRET_KEYWORDS.iter().any(|kw| upper.contains(kw))
        })
}

const SECRET_KEYWORDS: &[&str] = &["KEY", "TOKEN", "SECRET", "PASSWORD", "CREDENTIAL", "AUTH"];

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://").unwrap())
}

fn env_ref_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn curl_dash_d_is_egress() {
        assert!(is_data_egress("curl", &args(&["-d", "payload", "https://x"])));
    }

    #[test]
    fn curl_x_post_is_egress() {
        assert!(is_data_egress("curl", &args(&["-X", "POST", "https://x"])));
    }

    #[test]
    fn curl_compact_xpost_is_egress() {
        assert!(is_data_egress("curl", &args(&["-XPOST", "https://x"])));
    }

    #[test]
    fn curl_long_flag_eq_form_is_egress() {
        assert!(is_data_egress("curl", &args(&["--data=payload", "https://x"])));
    }

    #[test]
    fn plain_curl_get_is_not_egress() {
        assert!(!is_data_egress("curl", &args(&["https://x"])));
    }

    #[test]
    fn wget_post_data_is_egress() {
        assert!(is_data_egress("wget", &args(&["--post-data", "a=1", "https://x"])));
    }

    #[test]
    fn secret_env_var_in_url_detected() {
        assert!(is_secret_env_in_url(
            "curl",
            &args(&["https://x?t=$OPENAI_API_KEY"])
        ));
    }

    #[test]
    fn secret_env_var_braced_form_detected() {
        assert!(is_secret_env_in_url(
            "curl",
            &args(&["https://x?t=${MY_SECRET_TOKEN}"])
        ));
    }

    #[test]
    fn non_secret_env_var_in_url_not_detected() {
        assert!(!is_secret_env_in_url("curl", &args(&["https://x?region=$AWS_REGION"])));
    }

    #[test]
    fn env_var_without_url_not_detected() {
        assert!(!is_secret_env_in_url("curl", &args(&["$OPENAI_API_KEY"])));
    }
}
