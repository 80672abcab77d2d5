//! Rewards Engine
//!
//! The rewards engine contains the core logic for the rewards (loyalty points) server. It is split into three
//! sections:
//! 1. Database management and control. PostgreSQL is the supported backend. You should never need to access the
//!    database directly; use the API facades instead. The exception is the data types used in the database, which are
//!    defined in the `db_types` module and are public.
//! 2. The API facades ([`AuthApi`], [`OrderApi`], [`BalanceApi`]), which expose user, order and balance management to
//!    the HTTP layer. They are generic over the trait seams in [`traits`], so that the HTTP layer can be tested
//!    against mocks.
//! 3. The order-processing pipeline ([`pipeline::OrderPipeline`]), which drives every uploaded order through its
//!    status lifecycle by polling the external accrual service. The pipeline is fed by a PostgreSQL notification
//!    channel and a startup backfill scan, and fans work out over a bounded worker pool.

pub mod db_types;
pub mod pg;
pub mod pipeline;
pub mod traits;

mod api;

pub use api::{AuthApi, BalanceApi, OrderApi};
pub use pg::PgDatabase;
