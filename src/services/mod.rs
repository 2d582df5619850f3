// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod keychain;
pub mod onboarding;
pub mod trips;
pub mod weather;

pub use keychain::{Keychain, KeychainError};
pub use onboarding::{FinishType, FlowKind, SetupFlow, SetupPage};
pub use trips::TripService;
pub use weather::{WeatherCondition, WeatherError, WeatherService};
