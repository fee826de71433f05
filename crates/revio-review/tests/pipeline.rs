//! End-to-end runs of both tools against an in-memory PR and a scripted model.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use revio_core::{InlineComment, PrMetadata, RevioConfig, RevioError};
use revio_difflens::parser::{parse_unified_diff, FileDiff};
use revio_review::llm::{ChatMessage, ChatModel, Completion};
use revio_review::pipeline::CodeSuggestions;
use revio_review::provider::{Capability, GitProvider};
use revio_review::questions::Questions;

const DIFF: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,3 +1,4 @@
 fn main() {
-    let x = 1;
+    let x = compute();
+    println!(\"{x}\");
 }
diff --git a/src/util.rs b/src/util.rs
--- a/src/util.rs
+++ b/src/util.rs
@@ -10,2 +10,2 @@
-fn compute() -> i32 { 1 }
+fn compute() -> i32 { 2 }
 
diff --git a/Cargo.lock b/Cargo.lock
--- a/Cargo.lock
+++ b/Cargo.lock
@@ -1,1 +1,1 @@
-version = 1
+version = 2
diff --git a/src/io.rs b/src/io.rs
--- a/src/io.rs
+++ b/src/io.rs
@@ -5,1 +5,2 @@
-read();
+read()?;
+flush()?;
";

const SUGGESTIONS: &str = r#"```yaml
code_suggestions:
- relevant_file: src/lib.rs
  language: rust
  suggestion_content: Handle the error from compute
  existing_code: |
    let x = compute();
  improved_code: |
    let x = compute()?;
  relevant_lines_start: 2
  relevant_lines_end: 2
  label: possible issue
- relevant_file: src/util.rs
  language: rust
  suggestion_content: Nothing to change
  existing_code: |
    fn compute() -> i32 { 2 }
  improved_code: |
    fn compute() -> i32 { 2 }
  relevant_lines_start: 10
  relevant_lines_end: 10
  label: enhancement
```"#;

#[derive(Default)]
struct MemoryProvider {
    comments: Mutex<Vec<(String, bool)>>,
    removed: Mutex<usize>,
    published: Mutex<Vec<InlineComment>>,
}

impl MemoryProvider {
    fn comment_bodies(&self) -> Vec<String> {
        self.comments
            .lock()
            .unwrap()
            .iter()
            .map(|(body, _)| body.clone())
            .collect()
    }
}

#[async_trait]
impl GitProvider for MemoryProvider {
    async fn get_metadata(&self) -> Result<PrMetadata, RevioError> {
        Ok(PrMetadata {
            title: "Compute x".into(),
            branch: "feature/compute".into(),
            description: "Replaces the constant".into(),
            commit_messages: vec!["compute x".into()],
        })
    }

    async fn get_languages(&self) -> Result<BTreeMap<String, u64>, RevioError> {
        Ok(BTreeMap::from([("Rust".to_string(), 9000)]))
    }

    async fn get_diff(&self) -> Result<Vec<FileDiff>, RevioError> {
        parse_unified_diff(DIFF)
    }

    async fn get_file_content(&self, path: &str) -> Result<String, RevioError> {
        match path {
            "src/lib.rs" => Ok("fn main() {\n    let x = compute();\n}\n".into()),
            _ => Err(RevioError::FileNotFound(path.into())),
        }
    }

    async fn publish_comment(&self, body: &str, temporary: bool) -> Result<(), RevioError> {
        self.comments
            .lock()
            .unwrap()
            .push((body.to_string(), temporary));
        Ok(())
    }

    async fn remove_initial_comment(&self) -> Result<(), RevioError> {
        *self.removed.lock().unwrap() += 1;
        Ok(())
    }

    async fn publish_code_suggestions(&self, items: &[InlineComment]) -> Result<usize, RevioError> {
        self.published.lock().unwrap().extend_from_slice(items);
        Ok(0)
    }

    async fn publish_inline_comments(&self, items: &[InlineComment]) -> Result<usize, RevioError> {
        self.published.lock().unwrap().extend_from_slice(items);
        Ok(0)
    }

    fn get_line_link(&self, path: &str, start: u32, end: u32) -> String {
        format!("https://git.example/{path}#L{start}-{end}")
    }

    fn is_supported(&self, _capability: Capability) -> bool {
        true
    }
}

/// Answers by prompt kind; models listed in `broken` always fail.
struct ScriptedModel {
    suggestions: String,
    ranking: String,
    broken: Vec<String>,
    calls: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(suggestions: &str) -> Self {
        Self {
            suggestions: suggestions.to_string(),
            ranking: String::new(),
            broken: Vec::new(),
            calls: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<Completion, RevioError> {
        self.calls.lock().unwrap().push(model.to_string());
        if self.broken.iter().any(|b| b == model) {
            return Err(RevioError::Llm(format!("{model} is unavailable")));
        }
        let system = &messages[0].content;
        self.prompts
            .lock()
            .unwrap()
            .push(messages[1].content.clone());

        let text = if system.contains("ranking code suggestions") {
            self.ranking.clone()
        } else if system.contains("answer questions") {
            "  It replaces the constant with a call.  \n".to_string()
        } else {
            self.suggestions.clone()
        };
        Ok(Completion {
            text,
            finish_reason: Some("stop".into()),
        })
    }
}

fn tool(
    provider: &Arc<MemoryProvider>,
    model: &Arc<ScriptedModel>,
    config: RevioConfig,
) -> CodeSuggestions {
    CodeSuggestions::new(provider.clone(), model.clone(), config)
}

#[tokio::test]
async fn improve_publishes_only_real_changes() {
    let provider = Arc::new(MemoryProvider::default());
    let model = Arc::new(ScriptedModel::new(SUGGESTIONS));

    let run = tool(&provider, &model, RevioConfig::default())
        .run()
        .await
        .unwrap();

    assert_eq!(run.suggestions.len(), 1);
    assert_eq!(run.stats.files_reviewed, 3);
    assert_eq!(run.stats.files_skipped, 1);
    assert_eq!(run.stats.language, "rust");
    let report = run.stats.published.unwrap();
    assert_eq!(report.published, 1);

    let published = provider.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].path, "src/lib.rs");
    assert!(published[0]
        .body
        .contains("```suggestion\n    let x = compute()?;\n```"));

    let comments = provider.comments.lock().unwrap();
    assert_eq!(comments[0], ("Preparing suggestions...".to_string(), true));
    assert_eq!(*provider.removed.lock().unwrap(), 1);
}

#[tokio::test]
async fn prompt_carries_pr_context_and_numbered_diff() {
    let provider = Arc::new(MemoryProvider::default());
    let model = Arc::new(ScriptedModel::new(SUGGESTIONS));

    tool(&provider, &model, RevioConfig::default())
        .run()
        .await
        .unwrap();

    let prompts = model.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    let user = &prompts[0];
    assert!(user.contains("Title: 'Compute x'"));
    assert!(user.contains("Main PR language: 'rust'"));
    assert!(user.contains("## file: 'src/lib.rs'"));
    assert!(user.contains("__new hunk__"));
    assert!(user.contains("2 +    let x = compute();"));
    assert!(!user.contains("Cargo.lock"));
}

#[tokio::test]
async fn dry_run_publishes_nothing() {
    let provider = Arc::new(MemoryProvider::default());
    let model = Arc::new(ScriptedModel::new(SUGGESTIONS));
    let mut config = RevioConfig::default();
    config.output.publish_output = false;

    let run = tool(&provider, &model, config).run().await.unwrap();

    assert_eq!(run.suggestions.len(), 1);
    assert!(run.stats.published.is_none());
    assert!(provider.comments.lock().unwrap().is_empty());
    assert!(provider.published.lock().unwrap().is_empty());
    assert_eq!(*provider.removed.lock().unwrap(), 0);
}

#[tokio::test]
async fn falls_back_to_next_model() {
    let provider = Arc::new(MemoryProvider::default());
    let model = Arc::new(ScriptedModel {
        broken: vec!["primary".into()],
        ..ScriptedModel::new(SUGGESTIONS)
    });
    let mut config = RevioConfig::default();
    config.llm.model = "primary".into();
    config.llm.fallback_models = vec!["backup".into()];

    let run = tool(&provider, &model, config).run().await.unwrap();

    assert_eq!(run.suggestions.len(), 1);
    assert_eq!(model.calls(), vec!["primary", "backup"]);
}

#[tokio::test]
async fn failing_models_error_and_clean_up() {
    let provider = Arc::new(MemoryProvider::default());
    let model = Arc::new(ScriptedModel {
        broken: vec!["primary".into(), "backup".into()],
        ..ScriptedModel::new(SUGGESTIONS)
    });
    let mut config = RevioConfig::default();
    config.llm.model = "primary".into();
    config.llm.fallback_models = vec!["backup".into()];

    let err = tool(&provider, &model, config).run().await.unwrap_err();

    assert!(matches!(err, RevioError::Llm(_)));
    assert_eq!(*provider.removed.lock().unwrap(), 1);
    assert!(provider.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unparseable_output_publishes_no_suggestions_comment() {
    let provider = Arc::new(MemoryProvider::default());
    let model = Arc::new(ScriptedModel::new("I could not find anything."));

    let run = tool(&provider, &model, RevioConfig::default())
        .run()
        .await
        .unwrap();

    assert!(run.suggestions.is_empty());
    assert_eq!(
        provider.comment_bodies().last().map(String::as_str),
        Some("No suggestions found to improve this PR.")
    );
}

#[tokio::test]
async fn extended_mode_caps_model_calls() {
    let provider = Arc::new(MemoryProvider::default());
    let model = Arc::new(ScriptedModel::new(SUGGESTIONS));
    let mut config = RevioConfig::default();
    // no room for more than one hunk per chunk
    config.llm.max_input_tokens = Some(1);
    config.suggestions.max_number_of_calls = 2;
    config.suggestions.rank_extended_suggestions = false;
    config.output.publish_output = false;

    let run = tool(&provider, &model, config)
        .extended(true)
        .run()
        .await
        .unwrap();

    assert!(run.stats.extended);
    assert_eq!(run.stats.chunks_processed, 2);
    assert_eq!(run.stats.chunks_skipped, 1);
    assert_eq!(model.calls().len(), 2);
    assert_eq!(run.suggestions.len(), 2);
}

#[tokio::test]
async fn auto_extended_mode_without_flag() {
    let provider = Arc::new(MemoryProvider::default());
    let model = Arc::new(ScriptedModel::new(SUGGESTIONS));
    let mut config = RevioConfig::default();
    config.suggestions.auto_extended_mode = true;
    config.suggestions.rank_extended_suggestions = false;
    config.output.publish_output = false;

    let run = tool(&provider, &model, config).run().await.unwrap();

    assert!(run.stats.extended);
    assert_eq!(run.stats.chunks_processed, 1);
    assert_eq!(model.calls().len(), 1);
}

#[tokio::test]
async fn ranking_reorders_suggestions() {
    let two = SUGGESTIONS.replace(
        "improved_code: |\n    fn compute() -> i32 { 2 }",
        "improved_code: |\n    const fn compute() -> i32 { 2 }",
    );
    let provider = Arc::new(MemoryProvider::default());
    let model = Arc::new(ScriptedModel {
        ranking: "Sort Order:\n  - suggestion number: 1\n    importance order: 2\n  - suggestion number: 2\n    importance order: 1\n".into(),
        ..ScriptedModel::new(&two)
    });
    let mut config = RevioConfig::default();
    config.suggestions.rank_suggestions = true;
    config.output.publish_output = false;

    let run = tool(&provider, &model, config).run().await.unwrap();

    let files: Vec<&str> = run
        .suggestions
        .iter()
        .map(|s| s.relevant_file.as_str())
        .collect();
    assert_eq!(files, vec!["src/util.rs", "src/lib.rs"]);
    assert_eq!(model.calls().len(), 2);
}

#[tokio::test]
async fn ask_posts_trimmed_answer() {
    let provider = Arc::new(MemoryProvider::default());
    let model = Arc::new(ScriptedModel::new(SUGGESTIONS));

    let answer = Questions::new(
        provider.clone(),
        model.clone(),
        RevioConfig::default(),
        "What does this change?",
    )
    .run()
    .await
    .unwrap()
    .unwrap();

    assert!(answer.published);
    assert_eq!(answer.answer, "It replaces the constant with a call.");
    assert_eq!(
        provider.comment_bodies(),
        vec![
            "Preparing answer...".to_string(),
            "Question: What does this change?\n\nAnswer:\nIt replaces the constant with a call.\n\n"
                .to_string(),
        ]
    );
    assert_eq!(*provider.removed.lock().unwrap(), 1);

    let prompts = model.prompts.lock().unwrap();
    assert!(prompts[0].contains("What does this change?"));
}

#[tokio::test]
async fn ask_failure_posts_nothing() {
    let provider = Arc::new(MemoryProvider::default());
    let model = Arc::new(ScriptedModel {
        broken: vec!["gpt-4o".into(), "gpt-4o-mini".into()],
        ..ScriptedModel::new(SUGGESTIONS)
    });

    let answer = Questions::new(provider.clone(), model, RevioConfig::default(), "Why?")
        .run()
        .await
        .unwrap();

    assert!(answer.is_none());
    assert_eq!(provider.comment_bodies(), vec!["Preparing answer..."]);
    assert_eq!(*provider.removed.lock().unwrap(), 1);
}
