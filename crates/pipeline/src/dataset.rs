//! Dataset-type drivers: turn one input file into documents, then into a token stream.
//!
//! * **wiki** — whole file cleaned with [`clean_wikitext`], split on blank lines,
//!   section headers dropped.
//! * **lambada** — JSON lines; each `text` field is one document.
//! * **openwebtext** — plain text split on blank lines; zero-byte files are skipped.

use std::path::Path;

use serde::Deserialize;

use shardprep_common::{DatasetType, IoResultExt, PrepError, PrepResult};
use shardprep_core::{clean_lambada, clean_wikitext, is_wiki_heading, pack_documents, TokenStream, TokenizerAdapter};

const PARAGRAPH_BREAK: &str = "\n\n";

#[derive(Deserialize)]
struct LambadaLine {
    text: String,
}

fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split(PARAGRAPH_BREAK).filter(|p| !p.trim().is_empty())
}

/// Non-header paragraphs of a cleaned WikiText file.
pub fn wiki_documents(text: &str) -> Vec<String> {
    let cleaned = clean_wikitext(text);
    paragraphs(&cleaned)
        .filter(|p| !is_wiki_heading(p))
        .map(str::to_string)
        .collect()
}

/// Cleaned `text` field of every non-blank JSON line. `path` is only used in errors.
pub fn lambada_documents(path: &Path, text: &str) -> PrepResult<Vec<String>> {
    let mut docs = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: LambadaLine = serde_json::from_str(line).map_err(|e| PrepError::Json {
            path: path.display().to_string(),
            line: idx + 1,
            message: e.to_string(),
        })?;
        docs.push(clean_lambada(&parsed.text));
    }
    Ok(docs)
}

/// Blank-line separated paragraphs of a plain-text file.
pub fn openwebtext_documents(text: &str) -> Vec<String> {
    paragraphs(text).map(str::to_string).collect()
}

/// Read `path` and split it into documents the way `kind` prescribes.
pub fn read_documents(kind: DatasetType, path: &Path) -> PrepResult<Vec<String>> {
    match kind {
        DatasetType::Wiki => {
            let text = std::fs::read_to_string(path).with_path(path)?;
            Ok(wiki_documents(&text))
        }
        DatasetType::Lambada => {
            let text = std::fs::read_to_string(path).with_path(path)?;
            lambada_documents(path, &text)
        }
        DatasetType::OpenWebText => {
            if std::fs::metadata(path).with_path(path)?.len() == 0 {
                tracing::debug!(file = %path.display(), "Skipping empty file");
                return Ok(Vec::new());
            }
            let text = std::fs::read_to_string(path).with_path(path)?;
            Ok(openwebtext_documents(&text))
        }
    }
}

/// Tokenize one whole file into a stream with `end_marker` after every document.
pub fn file_stream(
    kind: DatasetType,
    tokenizer: &dyn TokenizerAdapter,
    path: &Path,
    end_marker: u32,
) -> PrepResult<TokenStream> {
    let docs = read_documents(kind, path)?;
    pack_documents(tokenizer, &docs, end_marker)
}
