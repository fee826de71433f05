//! Source language detection from file extensions.

use std::collections::BTreeMap;
use std::path::Path;

const EXTENSIONS: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("py", "python"),
    ("pyi", "python"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("go", "go"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("scala", "scala"),
    ("rb", "ruby"),
    ("php", "php"),
    ("c", "c"),
    ("h", "c"),
    ("cc", "cpp"),
    ("cpp", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("swift", "swift"),
    ("m", "objectivec"),
    ("dart", "dart"),
    ("lua", "lua"),
    ("sh", "bash"),
    ("bash", "bash"),
    ("zsh", "bash"),
    ("sql", "sql"),
    ("html", "html"),
    ("htm", "html"),
    ("css", "css"),
    ("scss", "scss"),
    ("vue", "vue"),
    ("ex", "elixir"),
    ("exs", "elixir"),
    ("erl", "erlang"),
    ("hs", "haskell"),
    ("clj", "clojure"),
    ("r", "r"),
    ("jl", "julia"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("toml", "toml"),
    ("json", "json"),
    ("md", "markdown"),
    ("tf", "hcl"),
];

/// Code-fence language for a file path, or `None` for unknown extensions.
///
/// # Examples
///
/// ```
/// use revio_difflens::language::language_for_path;
///
/// assert_eq!(language_for_path("src/main.rs"), Some("rust"));
/// assert_eq!(language_for_path("web/App.TSX"), Some("typescript"));
/// assert_eq!(language_for_path("LICENSE"), None);
/// ```
pub fn language_for_path(path: impl AsRef<Path>) -> Option<&'static str> {
    let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
}

/// Pick the language the PR is mostly written in.
///
/// `repo_languages` maps language names (as reported by the hosting
/// provider) to byte counts. The largest repo language that also appears
/// among the changed files wins; otherwise the most frequent language among
/// the changed files. Returns an empty string when nothing is recognised.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use revio_difflens::language::main_language;
///
/// let repo = BTreeMap::from([("Rust".to_string(), 9000), ("Python".to_string(), 100)]);
/// assert_eq!(main_language(&repo, ["tools/gen.py"]), "python");
/// assert_eq!(main_language(&repo, ["src/a.rs", "tools/gen.py"]), "rust");
/// ```
pub fn main_language<P: AsRef<Path>>(
    repo_languages: &BTreeMap<String, u64>,
    changed_files: impl IntoIterator<Item = P>,
) -> String {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for path in changed_files {
        if let Some(lang) = language_for_path(path) {
            *counts.entry(lang).or_default() += 1;
        }
    }

    let mut by_size: Vec<(&String, &u64)> = repo_languages.iter().collect();
    by_size.sort_by(|a, b| b.1.cmp(a.1));
    for (name, _) in by_size {
        let name = normalize(name);
        if counts.contains_key(name.as_str()) {
            return name;
        }
    }

    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
        .map(|(lang, _)| lang.to_string())
        .unwrap_or_default()
}

fn normalize(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "c++" => "cpp".into(),
        "c#" => "csharp".into(),
        "shell" => "bash".into(),
        "objective-c" => "objectivec".into(),
        "hcl" | "terraform" => "hcl".into(),
        other => other.to_string(),
    }
}
