//! Multi-document batch analysis over a stateful conversation.
//!
//! A batch registers its documents with the service, waits until every one
//! of them is ACTIVE, opens a conversation seeded with exactly those
//! documents and sends analysis prompts into it. Each batch gets its own
//! [`BatchSession`], so documents never leak between batches.

mod analyzer;
mod poll;
mod session;

pub use analyzer::{AnalysisOptions, BatchAnalyzer, UploadedFile};
pub use poll::{Backoff, PollPolicy};
pub use session::{BatchSession, BatchState};

/// Prompt sent when the caller supplies none.
pub const DEFAULT_ANALYSIS_PROMPT: &str = "以下のPDFファイルはすべて電気料金の請求書です。\
各ファイルから請求書情報を抽出し、ファイルごとに整理したJSONとして出力してください。\
値が見つからない項目はnullとしてください。";

/// Joined between the prompt and a requested output structure.
pub const STRUCTURE_DIRECTIVE: &str = "\n出力は以下の構造に従ってください: ";
