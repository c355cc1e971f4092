// Copyright Materialize, Inc. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository, or online at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A usage-based billing calculation and invoice assembly engine.
//!
//! Tenants model their products as [plans](model::Plan) composed of
//! [price components](model::PriceComponent), each bound to a named
//! [metric](model::Metric) and a pricing rule. Customers are attached to
//! plans via [subscriptions](model::Subscription). Callers record
//! [usage events](model::UsageEvent); periodically, or on demand for a date
//! range, the engine aggregates usage, applies pricing rules, enforces
//! minimum commitments, draws down prepaid credit balances, and emits an
//! [invoice](model::Invoice) with a line-item breakdown.
//!
//! The single entrypoint for embedding this engine is [`service::BillingService`].
//! This crate does not implement an HTTP surface, request validation,
//! authentication, or a database backend — those are left to the
//! application embedding it; see [`store`] for the persistence seam.
//!
//! # Maintainership
//!
//! * [View source code](https://github.com/example/usage-billing)
//! * [Report an issue](https://github.com/example/usage-billing/issues/new)
//! * [Submit a pull request](https://github.com/example/usage-billing/compare)

#![warn(missing_debug_implementations)]

pub mod config;
pub mod engine;
pub mod error;
pub mod formula;
pub mod ids;
pub mod model;
pub mod service;
pub mod store;

pub use config::EngineConfig;
pub use error::{BillingError, Result};
pub use service::BillingService;
