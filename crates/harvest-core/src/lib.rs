//! # harvest-core: Pure Query Planning for the Harvest Engine
//!
//! This crate decides *what* SQL the engine sends for a request. It has
//! zero I/O dependencies: no connections, no clocks, no caches.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Harvest Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Web backend (routes, auth, admin CRUD)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ QueryParams / JSON rows                │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                harvest-db (engine, caches, pool)                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ harvest-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌────────────┐    │   │
//! │  │   │  table   │  │  search  │  │  filter  │  │ pagination │    │   │
//! │  │   │descriptor│  │ strategy │  │  WHERE   │  │ plan + SQL │    │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └────────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`table`] - Typed descriptors for the managed tables
//! - [`types`] - Query parameters, bound values, result envelope
//! - [`search`] - Search strategy selection from lexical features
//! - [`filter`] - WHERE clause composition
//! - [`pagination`] - Page plan selection and statement rendering
//! - [`validation`] - Id and payload checks
//! - [`error`] - Validation error types
//!
//! ## Example Usage
//!
//! ```rust
//! use harvest_core::{plan_search, QueryParams, SearchStrategy, TableDescriptor};
//!
//! let table = TableDescriptor::crawler();
//! let query = QueryParams::new().title("te?t*").normalize(&table);
//!
//! let search = plan_search(query.title.as_deref(), &table);
//! assert_eq!(search.strategy, SearchStrategy::Wildcard);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod filter;
pub mod pagination;
pub mod search;
pub mod table;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{ValidationError, ValidationResult};
pub use filter::{build_where, WhereClause};
pub use pagination::{plan_page, PagePlan, PageQuery};
pub use search::{plan_search, SearchFeatures, SearchPredicate, SearchStrategy};
pub use table::{quote_ident, TableDescriptor, TableId, TableRegistry};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Page size used when the request does not name one.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u64 = 1000;

/// Search terms are cut to this many characters before planning.
pub const MAX_TITLE_CHARS: usize = 200;
