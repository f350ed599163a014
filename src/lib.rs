//! # hermes
//!
//! Hybrid semantic code search: an offline indexing plane that turns a
//! repository into co-registered artifacts, and an online serving plane
//! that answers natural-language queries with hybrid retrieval and neural
//! reranking.
//!
//! ## Search pipeline
//!
//! ```text
//!                    ┌──────────────┐
//!                    │  User Query   │
//!                    └──────┬───────┘
//!                           │ embed (cached, dense/hybrid only)
//!              ┌────────────┴────────────┐
//!              ▼                         ▼
//!      ┌──────────────┐         ┌──────────────┐
//!      │ Dense Index   │         │ Sparse Index │
//!      │ (Flat / IVF)  │         │   (BM25)     │
//!      └──────┬───────┘         └──────┬───────┘
//!             │    hybrid: RRF fusion   │
//!             └────────────┬────────────┘
//!                          │ filter (language / path prefix)
//!                          ▼
//!             ┌───────────────────────┐
//!             │ Cross-encoder rerank  │
//!             │ (bounded pool, join   │
//!             │  with deadline)       │
//!             └───────────┬───────────┘
//!                         │ truncate to top_k_rerank
//!                         ▼
//!             ┌───────────────────────┐
//!             │   Ranked results +    │
//!             │   per-stage timings   │
//!             └───────────────────────┘
//! ```
//!
//! ## Artifacts
//!
//! One build pass produces four co-registered artifacts in which chunk id,
//! dense-matrix row, and sparse document index are the same integer:
//! `metadata.db` (SQLite), `faiss.index` (dense vectors), `sparse_index.json`
//! (BM25 statistics), and `embeddings.npy` (raw float32 matrix).
//!
//! ## Module overview
//!
//! - [`config`] - structured settings: file + `HERMES_*` env overrides
//! - [`models`] - wire types: requests, responses, chunk records, summaries
//! - [`ingest`] - repository walking and language detection
//! - [`chunking`] - AST-aware and heuristic chunkers behind one trait
//! - [`embed`] - bi-encoder / cross-encoder wrappers and the query cache
//! - [`index`] - dense index, sparse index, metadata store, build pipeline
//! - [`search`] - RRF fusion and the multi-stage search pipeline
//! - [`api`] - axum handlers for the serving surface
//! - [`state`] - shared state: atomic pipeline slot, indexing job status

pub mod api;
pub mod chunking;
pub mod config;
pub mod embed;
pub mod error;
pub mod index;
pub mod ingest;
pub mod models;
pub mod search;
pub mod state;
