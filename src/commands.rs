//! Offline CLI commands: inspect, analyze and apply a local file.
//!
//! These run the same reader, generator and mutator as the server, without
//! the stores: each invocation reads the file, works on it and exits.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;

use crate::completion::create_client;
use crate::config::Config;
use crate::docx::{read_document, DocumentText};
use crate::models::{modified_filename, Suggestion, SuggestionSet};
use crate::mutate::apply_suggestions;
use crate::suggest::SuggestionGenerator;

/// `docxai inspect <file>`: statistics and numbered paragraphs.
pub fn run_inspect(path: &Path, json: bool) -> Result<()> {
    let doc = read(path)?;
    if json {
        let body = serde_json::json!({
            "metadata": doc.stats(),
            "paragraphs": doc.paragraphs,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let stats = doc.stats();
    println!("{}", path.display());
    println!("  words: {}", stats.word_count);
    println!(
        "  paragraphs: {} ({} including empty)",
        stats.paragraph_count,
        doc.total_paragraphs()
    );
    println!();
    for p in doc.non_blank() {
        println!("[{}] {}", p.index, p.text);
    }
    Ok(())
}

/// `docxai analyze <file> --query ...`: prints the suggestions.
pub async fn run_analyze(config: &Config, path: &Path, query: &str, json: bool) -> Result<()> {
    let set = analyze(config, path, query).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&set.suggestions)?);
        return Ok(());
    }
    print_suggestions(&set);
    Ok(())
}

/// Where `docxai apply` takes its suggestions from.
pub enum ApplySource {
    /// A JSON array written by `docxai analyze --json`.
    File(PathBuf),
    /// A fresh analysis. Only reproducible with the heuristics.
    Query(String),
}

/// `docxai apply <file> --suggestions s.json --ids s1,s2`: writes a
/// modified copy with the selected suggestions.
pub async fn run_apply(
    config: &Config,
    path: &Path,
    source: ApplySource,
    ids: &[String],
    output: Option<PathBuf>,
) -> Result<()> {
    if ids.is_empty() {
        bail!("--ids must name at least one suggestion");
    }
    let output = output.unwrap_or_else(|| default_output(path));
    if output == path {
        bail!("refusing to overwrite the source document");
    }

    let set = match source {
        ApplySource::File(file) => load_suggestions(path, &file)?,
        ApplySource::Query(query) => {
            let generator = generator(config)?;
            if generator.uses_model() {
                bail!(
                    "model suggestions differ between runs; save them with \
                     `docxai analyze --json` and pass the file with --suggestions"
                );
            }
            analyze_with(&generator, path, &query).await?
        }
    };

    let applied = apply_suggestions(path, &set, ids, &output)
        .with_context(|| format!("Failed to apply suggestions to {}", path.display()))?;
    println!(
        "Applied {} suggestion(s) to {} paragraph(s): {}",
        applied.applied_ids.len(),
        applied.paragraphs_changed,
        output.display()
    );
    if !applied.superseded_ids.is_empty() {
        println!(
            "Superseded by a later suggestion for the same paragraph: {}",
            applied.superseded_ids.join(", ")
        );
    }
    Ok(())
}

/// Rebuilds a set from saved suggestions. Each one is still checked against
/// the current paragraph text when applied.
fn load_suggestions(document: &Path, file: &Path) -> Result<SuggestionSet> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let suggestions: Vec<Suggestion> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a suggestion list from `analyze --json`", file.display()))?;
    let doc = read(document)?;
    Ok(SuggestionSet {
        doc_id: doc_id(document),
        query: String::new(),
        paragraph_total: doc.total_paragraphs(),
        suggestions,
        generated_at: Utc::now(),
    })
}

async fn analyze(config: &Config, path: &Path, query: &str) -> Result<SuggestionSet> {
    analyze_with(&generator(config)?, path, query).await
}

fn generator(config: &Config) -> Result<SuggestionGenerator> {
    let generator = SuggestionGenerator::new(config.model.clone(), create_client(&config.model)?);
    if !generator.uses_model() {
        eprintln!("OPENAI_API_KEY not set, using built-in heuristics.");
    }
    Ok(generator)
}

async fn analyze_with(
    generator: &SuggestionGenerator,
    path: &Path,
    query: &str,
) -> Result<SuggestionSet> {
    if query.trim().is_empty() {
        bail!("--query must not be empty");
    }
    let doc = read(path)?;
    Ok(generator.generate(&doc_id(path), &doc, query.trim()).await)
}

fn doc_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("local-{}", Utc::now().timestamp()))
}

fn read(path: &Path) -> Result<DocumentText> {
    read_document(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn default_output(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(modified_filename(&name))
}

fn print_suggestions(set: &SuggestionSet) {
    if set.is_empty() {
        println!("No suggestions.");
        return;
    }
    for s in &set.suggestions {
        println!(
            "{}. paragraph {} [{:?} / {:?}]",
            s.id, s.paragraph_index, s.category, s.source
        );
        println!("    - {}", s.original);
        println!("    + {}", s.suggested);
        println!("    reason: {}", s.reason);
        println!();
    }
}
