//! Supported bot languages and their launch strategies.
//!
//! The strategy table is pure data: file extension, run command and an
//! optional compile command per language. The working file path is appended
//! as the final run argument, except for compiled languages where the run
//! command invokes the compiled artifact stem instead.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Language {
    #[default]
    Javascript,
    Typescript,
    Python,
    Java,
    Csharp,
    Go,
    Ruby,
    Php,
    Bash,
}

impl Language {
    /// Resolve a language name. Unknown names fall back to javascript,
    /// matching the launch strategy contract.
    pub fn from_name(name: &str) -> Self {
        match name {
            "javascript" => Language::Javascript,
            "typescript" => Language::Typescript,
            "python" => Language::Python,
            "java" => Language::Java,
            "csharp" => Language::Csharp,
            "go" => Language::Go,
            "ruby" => Language::Ruby,
            "php" => Language::Php,
            "bash" => Language::Bash,
            _ => Language::Javascript,
        }
    }
}

impl From<String> for Language {
    fn from(name: String) -> Self {
        Language::from_name(&name)
    }
}

/// Language-specific recipe for turning bot source into a running process.
#[derive(Debug, Clone, Copy)]
pub struct LaunchStrategy {
    /// Working file extension (without the dot).
    pub extension: &'static str,
    /// Run command: program followed by fixed argv prefix.
    pub run: &'static [&'static str],
    /// Compile command run before `run`, if the language needs one.
    /// The working file path is appended as its final argument.
    pub compile: Option<&'static [&'static str]>,
}

impl LaunchStrategy {
    /// Whether the run command takes the compiled artifact stem
    /// (e.g. `java bot_<id>`) rather than the source file path.
    pub fn runs_artifact(&self) -> bool {
        self.compile.is_some()
    }
}

impl Language {
    pub fn strategy(self) -> &'static LaunchStrategy {
        match self {
            Language::Javascript => &LaunchStrategy {
                extension: "js",
                run: &["node"],
                compile: None,
            },
            Language::Typescript => &LaunchStrategy {
                extension: "ts",
                run: &["npx", "ts-node"],
                compile: None,
            },
            Language::Python => &LaunchStrategy {
                extension: "py",
                run: &["python"],
                compile: None,
            },
            Language::Java => &LaunchStrategy {
                extension: "java",
                run: &["java"],
                compile: Some(&["javac"]),
            },
            Language::Csharp => &LaunchStrategy {
                extension: "cs",
                run: &["dotnet", "run"],
                compile: None,
            },
            Language::Go => &LaunchStrategy {
                extension: "go",
                run: &["go", "run"],
                compile: None,
            },
            Language::Ruby => &LaunchStrategy {
                extension: "rb",
                run: &["ruby"],
                compile: None,
            },
            Language::Php => &LaunchStrategy {
                extension: "php",
                run: &["php"],
                compile: None,
            },
            Language::Bash => &LaunchStrategy {
                extension: "sh",
                run: &["bash"],
                compile: None,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Python => "python",
            Language::Java => "java",
            Language::Csharp => "csharp",
            Language::Go => "go",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Bash => "bash",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
