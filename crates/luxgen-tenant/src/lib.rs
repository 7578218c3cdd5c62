//! LuxGen Tenancy - tenant resolution and data isolation
//!
//! Every inbound request is mapped to exactly one tenant, and everything the
//! request touches afterwards is scoped to that tenant.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         TENANCY PIPELINE                                │
//! │                                                                         │
//! │   request signals (host, headers, query, principal)                     │
//! │          │                                                              │
//! │  ┌───────▼──────────────────────────────────────────────────────────┐  │
//! │  │                      TENANT RESOLVER                              │  │
//! │  │  subdomain → domain → header → query → claim → default            │  │
//! │  │  exists → active → subscription            (TenantDirectory)      │  │
//! │  └───────┬──────────────────────────────────────────────────────────┘  │
//! │          │ Resolution                                                   │
//! │  ┌───────▼──────────────────────────────────────────────────────────┐  │
//! │  │                     ISOLATION MANAGER                             │  │
//! │  │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌────────┐  │  │
//! │  │  │ Handle  │  │ Tenant  │  │ Quotas  │  │Features │  │ Rate   │  │  │
//! │  │  │ Cache   │  │ Filter  │  │         │  │         │  │ Limits │  │  │
//! │  │  └─────────┘  └─────────┘  └─────────┘  └─────────┘  └────────┘  │  │
//! │  └───────┬──────────────────────────────────────────────────────────┘  │
//! │          │ TenantContext                                                │
//! │          ▼                                                              │
//! │   every data operation carries {tenantId}                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod directory;
pub mod entitlements;
pub mod error;
pub mod isolation;
pub mod limits;
pub mod metering;
pub mod model;
pub mod ratelimit;
pub mod resolver;

pub use config::TenancyConfig;
pub use directory::{InMemoryTenantDirectory, TenantDirectory};
pub use error::{TenancyError, TenancyResult};
pub use isolation::{
    HandleFactory, InMemoryHandleFactory, IsolationManager, ResourceHandle, TenantContext,
    TenantDatabase, TenantFilter, TenantScope,
};
pub use limits::{InMemoryUsageStore, Limit, QuotaLimits, QuotaResource, UsageStore};
pub use metering::{UsageSnapshot, UsageTracker};
pub use model::{Subscription, SubscriptionStatus, Tenant, Tier, TierTable};
pub use ratelimit::{RateLimitDecision, RateLimiter};
pub use resolver::{IdentificationMethod, Principal, RequestSignals, Resolution, TenantResolver};

pub use luxgen_common::TenantId;
