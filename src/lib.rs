//! # Article Weaver
//!
//! Combines short text fragments into longer articles.
//!
//! Two operations are offered: **create** writes a new article from two or
//! three reference materials, and **merge** stitches two or three existing
//! articles into one, annotating every segment with where it came from. Both
//! use a generative language backend when one is configured and degrade to a
//! deterministic local composition when it is not, or when it fails.
//!
//! ## Architecture
//!
//! ```text
//!  materials ──▶ ┌──────────┐   prompt   ┌──────────────┐  HTTP/SSE  ┌─────────┐
//!                │ Creator  │──────────▶│ Generation   │──────────▶│  proxy  │──▶ upstream
//!                │          │◀──────────│ Client       │◀──────────│ (axum)  │    API
//!                └────┬─────┘  raw text  └──────────────┘            └─────────┘
//!                     │
//!        parse / fallback / title
//!                     ▼
//!               ┌───────────┐
//!               │  Article  │──▶ JSON store ──▶ list / show / export
//!               └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! weave create "first material" "second material"
//! weave merge @a.txt @b.txt @c.txt --segments
//! weave list
//! weave serve proxy
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Segments, merged articles, branch results |
//! | [`error`] | Validation and generation errors |
//! | [`prompt`] | Prompt construction |
//! | [`wire`] | Provider and proxy request/response shapes |
//! | [`sse`] | Incremental SSE decoding |
//! | [`client`] | Generation clients (direct, proxy) |
//! | [`parser`] | Structured-block extraction from completions |
//! | [`fallback`] | Deterministic composition and titles |
//! | [`pipeline`] | The create/merge orchestration |
//! | [`article`] | Saved article records and export helpers |
//! | [`store`] | Article persistence |
//! | [`proxy`] | Credential-hiding HTTP proxy |

pub mod article;
pub mod client;
pub mod config;
pub mod error;
pub mod fallback;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod proxy;
pub mod sse;
pub mod store;
pub mod wire;
