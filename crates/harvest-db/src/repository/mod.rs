//! # Repository Module
//!
//! Row-level operations layered on the engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  HTTP handler                                                          │
//! │       │                                                                 │
//! │       │  engine.records(TableId::Crawler)?.get_by_id(42, true, ..)      │
//! │       ▼                                                                 │
//! │  RecordRepository                                                      │
//! │  ├── create(&self, fields)                                             │
//! │  ├── update(&self, id, fields, enforce_soft_delete)                    │
//! │  ├── delete(&self, id, hard)                                           │
//! │  └── get_by_id(&self, id, enforce_soft_delete, projection, ttl)        │
//! │       │                                                                 │
//! │       │  TimedExecutor (statement timeout)                              │
//! │       ▼                                                                 │
//! │  MySQL                                                                  │
//! │                                                                         │
//! │  Writes clear the result and count caches.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod records;

pub use records::RecordRepository;
