//! Credential injection and source sanitization.
//!
//! Both passes are best-effort textual rewrites over an explicit, enumerable
//! rule table. Neither understands program structure: injection can silently
//! match nothing (the source runs unmodified) and can rewrite unrelated text
//! that happens to look like a placeholder. The sanitizer is a denylist of
//! literal constructs and is NOT a security boundary — any equivalent
//! construct spelled differently passes through unchanged.

use regex::{NoExpand, Regex};

use crate::language::Language;

/// Minimum credential length accepted by the shape check.
const CREDENTIAL_MIN_LEN: usize = 30;

/// Structural check for credentials: at least three `.`-separated segments
/// and more than [`CREDENTIAL_MIN_LEN`] characters. A shape heuristic, not
/// cryptographic validation.
pub fn validate_credential(credential: &str) -> bool {
    credential.split('.').count() >= 3 && credential.len() > CREDENTIAL_MIN_LEN
}

/// A single injection rule: a placeholder pattern and the replacement
/// template it rewrites to. `{credential}` in the template is filled with
/// the literal credential at apply time.
struct InjectRule {
    pattern: Regex,
    template: &'static str,
}

impl InjectRule {
    fn new(pattern: &str, template: &'static str) -> Self {
        Self {
            // Patterns are fixed literals in this module; a failed compile
            // is a programming error caught by the unit tests.
            pattern: Regex::new(pattern).expect("invalid injection pattern"),
            template,
        }
    }

    fn apply(&self, source: &str, credential: &str) -> String {
        let replacement = self.template.replace("{credential}", credential);
        // NoExpand: the credential is opaque text and must never be
        // interpreted as a capture-group reference.
        self.pattern
            .replace_all(source, NoExpand(&replacement))
            .into_owned()
    }
}

/// Rewrites bot source text, replacing known credential placeholders with
/// the real credential before launch.
pub struct CredentialInjector {
    generic: Vec<InjectRule>,
    python: Vec<InjectRule>,
    javascript: Vec<InjectRule>,
}

impl CredentialInjector {
    pub fn new() -> Self {
        let generic = vec![
            InjectRule::new(r"process\.env\.BOT_TOKEN", "'{credential}'"),
            InjectRule::new(r#"(?i)['"]?place ur bot token['"]?"#, "'{credential}'"),
            InjectRule::new(r#"(?i)['"]?put ur bot token here['"]?"#, "'{credential}'"),
            InjectRule::new(r#"(?i)['"]?YOUR_BOT_TOKEN['"]?"#, "'{credential}'"),
            InjectRule::new(r#"(?i)['"]?<BOT_TOKEN>['"]?"#, "'{credential}'"),
            InjectRule::new(r#"(?i)['"]?BOT_TOKEN['"]?"#, "'{credential}'"),
            InjectRule::new(r#"(?i)['"]?your_token_here['"]?"#, "'{credential}'"),
            InjectRule::new(r#"(?i)['"]?your-bot-token['"]?"#, "'{credential}'"),
        ];

        let python = vec![
            InjectRule::new(r#"bot\.run\(['"](.*?)['"]\)"#, "bot.run('{credential}')"),
            InjectRule::new(r#"client\.run\(['"](.*?)['"]\)"#, "client.run('{credential}')"),
            InjectRule::new(r#"TOKEN\s*=\s*['"](.*?)['"]"#, "TOKEN = '{credential}'"),
        ];

        let javascript = vec![
            InjectRule::new(r#"client\.login\(['"](.*?)['"]\)"#, "client.login('{credential}')"),
            InjectRule::new(r#"bot\.login\(['"](.*?)['"]\)"#, "bot.login('{credential}')"),
        ];

        Self {
            generic,
            python,
            javascript,
        }
    }

    /// Apply every rule unconditionally: the language-agnostic pass first,
    /// then the language-specific pass. Zero matches is not an error —
    /// launching proceeds with whatever text results.
    pub fn inject(&self, source: &str, credential: &str, language: Language) -> String {
        let mut result = source.to_string();
        for rule in &self.generic {
            result = rule.apply(&result, credential);
        }

        let specific = match language {
            Language::Python => &self.python,
            Language::Javascript | Language::Typescript => &self.javascript,
            _ => return result,
        };
        for rule in specific {
            result = rule.apply(&result, credential);
        }
        result
    }
}

impl Default for CredentialInjector {
    fn default() -> Self {
        Self::new()
    }
}

/// Denylisted constructs rewritten to an inert marker comment before a
/// bot record is stored. Advisory hardening only.
const SANITIZE_PATTERNS: &[&str] = &[
    r#"require\s*\(\s*['"]fs['"]\s*\)"#,
    r#"require\s*\(\s*['"]child_process['"]\s*\)"#,
    r#"require\s*\(\s*['"]path['"]\s*\)"#,
    r"process\.exit",
    r"process\.kill",
];

/// Replace each denylisted construct with `// BLOCKED: <pattern>`.
pub fn sanitize_source(source: &str) -> String {
    let mut sanitized = source.to_string();
    for pattern in SANITIZE_PATTERNS {
        let re = Regex::new(pattern).expect("invalid sanitize pattern");
        let marker = format!("// BLOCKED: {}", pattern);
        sanitized = re.replace_all(&sanitized, NoExpand(&marker)).into_owned();
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRED: &str = "aaaaaaaaaa.bbbbbbbbbb.cccccccccc";

    #[test]
    fn test_validate_credential_shape() {
        assert!(validate_credential(CRED));
        // 1 segment
        assert!(!validate_credential("short"));
        // 3 segments but too short
        assert!(!validate_credential("a.b.c"));
        // 4 segments, long enough
        assert!(validate_credential("aaaaaaaa.bbbbbbbb.cccccccc.dddddddd"));
    }

    #[test]
    fn test_python_token_assignment() {
        let injector = CredentialInjector::new();
        let out = injector.inject("TOKEN = 'x'", CRED, Language::Python);
        assert_eq!(out, format!("TOKEN = '{}'", CRED));
    }

    #[test]
    fn test_python_run_calls() {
        let injector = CredentialInjector::new();
        let out = injector.inject("bot.run('placeholder')", CRED, Language::Python);
        assert_eq!(out, format!("bot.run('{}')", CRED));
        let out = injector.inject("client.run(\"old\")", CRED, Language::Python);
        assert_eq!(out, format!("client.run('{}')", CRED));
    }

    #[test]
    fn test_javascript_login_calls() {
        let injector = CredentialInjector::new();
        let out = injector.inject("client.login('tok')", CRED, Language::Javascript);
        assert_eq!(out, format!("client.login('{}')", CRED));
        let out = injector.inject("bot.login('tok')", CRED, Language::Typescript);
        assert_eq!(out, format!("bot.login('{}')", CRED));
    }

    #[test]
    fn test_generic_placeholders() {
        let injector = CredentialInjector::new();
        let out = injector.inject("const t = process.env.BOT_TOKEN;", CRED, Language::Javascript);
        assert_eq!(out, format!("const t = '{}';", CRED));
        let out = injector.inject("login(YOUR_BOT_TOKEN)", CRED, Language::Ruby);
        assert_eq!(out, format!("login('{}')", CRED));
        let out = injector.inject("token = \"your_token_here\"", CRED, Language::Ruby);
        assert_eq!(out, format!("token = '{}'", CRED));
    }

    #[test]
    fn test_inject_is_identity_without_placeholders() {
        let injector = CredentialInjector::new();
        let source = "print('hello world')\nfor i in range(3): pass\n";
        assert_eq!(injector.inject(source, CRED, Language::Python), source);
    }

    #[test]
    fn test_credential_with_dollar_sign_is_literal() {
        let injector = CredentialInjector::new();
        let cred = "aaaaaaaaaa.bbbb$1bbbb.cccccccccc";
        let out = injector.inject("TOKEN = 'x'", cred, Language::Python);
        assert_eq!(out, format!("TOKEN = '{}'", cred));
    }

    #[test]
    fn test_sanitize_blocks_dangerous_constructs() {
        let out = sanitize_source("const fs = require('fs');");
        assert!(out.contains("// BLOCKED:"), "got: {}", out);
        assert!(!out.contains("require('fs')"));

        let out = sanitize_source("process.exit(1)");
        assert!(out.starts_with("// BLOCKED:"));
    }

    #[test]
    fn test_sanitize_passes_clean_source() {
        let source = "console.log('hi')";
        assert_eq!(sanitize_source(source), source);
    }

    #[test]
    fn test_sanitize_is_not_a_sandbox() {
        // An equivalent construct spelled differently passes through.
        let source = "const cp = require('child' + '_process');";
        assert_eq!(sanitize_source(source), source);
    }
}
