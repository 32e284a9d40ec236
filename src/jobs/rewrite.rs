use regex::bytes::{NoExpand, Regex};

use crate::config::ServerEntry;
use crate::error::{JobdropError, Result};
use crate::jobs::ORIGINAL_CONFIG_FILE;

/// Network shares and the local directories they are mounted at.
///
/// Uploaded configs are usually written on Windows and point at shares such as
/// `\\zinu\data` or `smb://zinu.cortexlab.net/data`; on this host the same
/// data lives under a local prefix.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    entries: Vec<ShareRule>,
}

#[derive(Debug, Clone)]
struct ShareRule {
    share: String,
    local_path: String,
    replacement: Vec<u8>,
    pattern: Regex,
}

impl ServerRegistry {
    pub fn new<I, S, P>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(share, path)| ShareRule::new(share.into(), path.into()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }

    pub fn from_config(servers: &[ServerEntry]) -> Result<Self> {
        Self::new(servers.iter().map(|s| (s.share.clone(), s.path.clone())))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn shares(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|rule| (rule.share.as_str(), rule.local_path.as_str()))
    }
}

impl ShareRule {
    fn new(share: String, local_path: String) -> Result<Self> {
        let share_re = regex::escape(&share);
        // UNC form `\\share[.domain]\` (any run of backslashes, so escaped
        // `\\\\share\\` is covered too) or `smb://share[.domain]/`.
        let pattern = Regex::new(&format!(
            r"(?i)\\+{share}(?:\.[a-z0-9-]+)*\\+|smb://{share}(?:\.[a-z0-9-]+)*/",
            share = share_re
        ))
        .map_err(|e| JobdropError::Config(format!("bad share name {:?}: {}", share, e)))?;

        let local_path = format!("{}/", local_path.trim_end_matches('/'));
        Ok(Self {
            share,
            replacement: local_path.clone().into_bytes(),
            local_path,
            pattern,
        })
    }
}

/// First line(s) of every rewritten config.
pub fn banner() -> String {
    format!(
        ";;; WARNING - This file is autogenerated from the real config file {}.  \
         Paths and escape sequences have been modified.\n\n\n",
        ORIGINAL_CONFIG_FILE
    )
}

/// Substitute share references and normalize doubled backslashes.
///
/// Works on raw bytes: uploads are often cp1252 rather than UTF-8, and every
/// byte outside a matched pattern is copied through untouched.
pub fn rewrite_paths(original: &[u8], registry: &ServerRegistry) -> Vec<u8> {
    let mut contents = original.to_vec();
    for rule in &registry.entries {
        let replaced = rule
            .pattern
            .replace_all(&contents, NoExpand(&rule.replacement))
            .into_owned();
        contents = replaced;
    }
    collapse_double_backslashes(&contents)
}

fn collapse_double_backslashes(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'\\' && input.get(i + 1) == Some(&b'\\') {
            out.push(b'/');
            i += 2;
        } else {
            out.push(input[i]);
            i += 1;
        }
    }
    out
}

/// Full rewrite of an uploaded config: paths first, then the banner.
pub fn rewrite(original: &[u8], registry: &ServerRegistry) -> Vec<u8> {
    let mut out = banner().into_bytes();
    out.extend_from_slice(&rewrite_paths(original, registry));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(text: &str, registry: &ServerRegistry) -> String {
        String::from_utf8(rewrite_paths(text.as_bytes(), registry)).unwrap()
    }

    fn registry() -> ServerRegistry {
        ServerRegistry::new([
            ("zinu", "/home/max/servers/zinu"),
            ("zserver", "/home/max/servers/zserver/"),
        ])
        .unwrap()
    }

    #[test]
    fn unc_path_is_substituted() {
        let reg = ServerRegistry::new([("fileserver", "/mnt/data")]).unwrap();
        let out = String::from_utf8(rewrite(br"\\fileserver\data\x.bin", &reg)).unwrap();
        assert!(out.contains("/mnt/data/data"));
        assert!(!out.to_lowercase().contains(r"\\fileserver\"));
        assert!(!out.contains("fileserver"));
    }

    #[test]
    fn escaped_unc_path_becomes_posix() {
        let out = paths(r"path = \\\\zinu\\data\\run1\\out.bin", &registry());
        assert_eq!(out, "path = /home/max/servers/zinu/data/run1/out.bin");
    }

    #[test]
    fn domain_suffix_and_case_are_ignored() {
        let out = paths(r"a=\\ZINU.cortexlab.net\x", &registry());
        assert_eq!(out, "a=/home/max/servers/zinu/x");
    }

    #[test]
    fn smb_form_is_substituted() {
        let out = paths("b=smb://zserver.cortexlab.net/exp/1", &registry());
        assert_eq!(out, "b=/home/max/servers/zserver/exp/1");
        let out = paths("b=SMB://ZServer/exp", &registry());
        assert_eq!(out, "b=/home/max/servers/zserver/exp");
    }

    #[test]
    fn similar_share_names_are_untouched() {
        let out = paths(r"c=\zinux\data", &registry());
        assert_eq!(out, r"c=\zinux\data");
    }

    #[test]
    fn unrelated_text_is_preserved() {
        let text = "; Comment With CAPS\n[Section]\nkey = Value \\n stays\n";
        assert_eq!(paths(text, &registry()), text);
    }

    #[test]
    fn remaining_double_backslashes_are_normalized() {
        let out = paths(r"d=C:\\Users\\max", &registry());
        assert_eq!(out, "d=C:/Users/max");
    }

    #[test]
    fn banner_is_prepended() {
        let out = String::from_utf8(rewrite(b"[a]\n", &ServerRegistry::default())).unwrap();
        assert!(out.starts_with(";;; WARNING - This file is autogenerated"));
        assert!(out.ends_with("\n\n\n[a]\n"));
    }

    #[test]
    fn path_substitution_is_idempotent() {
        let once = paths(r"e=\\\\zinu\\a\\b", &registry());
        assert_eq!(paths(&once, &registry()), once);
    }

    #[test]
    fn replacement_dollar_signs_are_literal() {
        let reg = ServerRegistry::new([("cash", "/mnt/$1")]).unwrap();
        assert_eq!(paths(r"\\cash\x", &reg), "/mnt/$1/x");
    }

    #[test]
    fn non_utf8_bytes_pass_through() {
        let reg = ServerRegistry::new([("zinu", "/mnt/zinu")]).unwrap();
        let out = rewrite_paths(b"; width 5 \xb5m\npath = \\\\zinu\\\\d\n", &reg);
        assert_eq!(out, b"; width 5 \xb5m\npath = /mnt/zinu/d\n".to_vec());
    }

    #[test]
    fn lone_backslashes_survive_normalization() {
        assert_eq!(collapse_double_backslashes(br"a\\b\c\"), br"a/b\c\".to_vec());
        assert_eq!(collapse_double_backslashes(br"x\\\y"), br"x/\y".to_vec());
        assert_eq!(collapse_double_backslashes(br"\"), br"\".to_vec());
    }

    #[test]
    fn share_names_with_regex_chars_are_escaped() {
        let reg = ServerRegistry::new([("a+b", "/mnt/ab")]).unwrap();
        assert_eq!(paths(r"\\a+b\x", &reg), "/mnt/ab/x");
        assert_eq!(paths(r"\\aab\x", &reg), r"/aab\x");
    }
}
