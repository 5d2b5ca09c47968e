//! 目录与外部数据：食品目录、模糊解析、订单、文档检索（内存 / SQLite 两种后端）

pub mod db;
pub mod documents;
pub mod entry;
pub mod orders;
pub mod resolver;
pub mod seed;

pub use db::SqliteDb;
pub use documents::{DocumentRetriever, DocumentStore, InMemoryDocuments, ScoredDocument, SqliteDocuments};
pub use entry::{CatalogEntry, CatalogStore, InMemoryCatalog, SqliteCatalog};
pub use orders::{CancelOutcome, InMemoryOrderStore, Order, OrderStore, SqliteOrderStore};
pub use resolver::{fuzzy_distance, rank_matches, weighted_distance, EditWeights, EntityResolver, ResolvedMatch};
