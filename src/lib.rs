//! # DocxAI
//!
//! Paragraph-level editing suggestions for Word documents.
//!
//! A `.docx` file is uploaded, its body paragraphs are sent in small batches
//! to a chat completion model together with the user's editing request
//! ("make it more formal"), and the model's proposed rewrites come back as
//! [`Suggestion`](models::Suggestion)s. The user picks some of them, and a
//! modified copy of the document is written with only those paragraphs
//! replaced. Without a model credential, deterministic heuristics produce
//! the suggestions instead.
//!
//! ## Architecture
//!
//! ```text
//!                ┌────────────┐   ┌──────────────┐   ┌────────────┐
//!   upload ─────▶│   docx     │──▶│   suggest    │──▶│   store    │
//!                │  (reader)  │   │ model/heur.  │   │  (sets)    │
//!                └────────────┘   └──────────────┘   └─────┬──────┘
//!                                                          │
//!   apply ──────────────────────────────────────────▶┌─────▼──────┐
//!                                                    │   mutate   │──▶ <id>_modified_<rid>.docx
//!                                                    └────────────┘
//!
//!        ┌──────────┐   ┌──────────────┐   ┌──────────┐
//!        │   CLI    │   │  REST (axum) │   │   MCP    │   all share one AppContext
//!        └──────────┘   └──────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docxai inspect report.docx
//! docxai analyze report.docx --query "make it more formal" --json > suggestions.json
//! docxai apply report.docx --suggestions suggestions.json --ids s1,s3 --output out.docx
//! docxai serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`docx`] | Paragraph extraction from `.docx` packages |
//! | [`chunk`] | Paragraph batching for model requests |
//! | [`completion`] | Chat completion client abstraction |
//! | [`reply`] | Model reply validation |
//! | [`heuristics`] | Rule-based fallback suggestions |
//! | [`suggest`] | Suggestion generation |
//! | [`store`] | In-memory document and suggestion stores |
//! | [`mutate`] | Writing modified documents |
//! | [`context`] | Shared application context |
//! | [`widget`] | Widget page rendering |
//! | [`public_url`] | Public base URL discovery |
//! | [`server`] | HTTP server (Axum) |
//! | [`mcp`] | MCP bridge |
//! | [`commands`] | CLI command implementations |

pub mod chunk;
pub mod commands;
pub mod completion;
pub mod config;
pub mod context;
pub mod docx;
pub mod error;
pub mod heuristics;
pub mod mcp;
pub mod models;
pub mod mutate;
pub mod public_url;
pub mod reply;
pub mod server;
pub mod store;
pub mod suggest;
pub mod widget;
