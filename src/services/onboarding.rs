// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Linear onboarding flow: which page is showing and where next/back lead.

use std::time::Duration;

/// Delay before leaving the finished page of the setup flow.
pub const SETUP_FINISHED_DISMISS_DELAY: Duration = Duration::from_secs(6);
/// Delay before leaving the connected-app finished page.
pub const CONNECTED_APP_FINISHED_DISMISS_DELAY: Duration = Duration::from_secs(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPage {
    Terms,
    Rating,
    Battery,
    CreateProfile,
    ConfirmEmail,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// First launch
    GettingStarted,
    /// Creating a profile later from settings
    CreateProfile,
}

impl FlowKind {
    pub fn pages(self) -> &'static [SetupPage] {
        match self {
            FlowKind::GettingStarted => &[
                SetupPage::Terms,
                SetupPage::Rating,
                SetupPage::Battery,
                SetupPage::CreateProfile,
                SetupPage::ConfirmEmail,
                SetupPage::Finished,
            ],
            FlowKind::CreateProfile => &[
                SetupPage::CreateProfile,
                SetupPage::ConfirmEmail,
                SetupPage::Finished,
            ],
        }
    }
}

/// How the flow ended; selects the finished-page message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishType {
    InitialSetupSkippedAccount,
    InitialSetupCreatedAccount,
    CreateAccountSkippedAccount,
    CreatedAccountCreatedAccount,
}

impl FinishType {
    /// Markdown shown on the finished page.
    pub fn message(self) -> &'static str {
        match self {
            FinishType::InitialSetupSkippedAccount | FinishType::InitialSetupCreatedAccount => {
                "**You're all set**! Go get on your bike and Ride Report will take care of the rest."
            }
            FinishType::CreateAccountSkippedAccount => "**You're all set**!",
            FinishType::CreatedAccountCreatedAccount => {
                "Cool. You can always create an account later if you'd like to."
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetupFlow {
    kind: FlowKind,
    current: usize,
    has_seen_setup: bool,
    finish_type: Option<FinishType>,
}

impl SetupFlow {
    pub fn new(kind: FlowKind) -> Self {
        Self {
            kind,
            current: 0,
            has_seen_setup: false,
            finish_type: None,
        }
    }

    pub fn kind(&self) -> FlowKind {
        self.kind
    }

    pub fn current_page(&self) -> SetupPage {
        self.kind.pages()[self.current]
    }

    /// True when the profile pages are shown outside of first launch.
    pub fn is_creating_profile_outside_getting_started(&self) -> bool {
        self.kind == FlowKind::CreateProfile
    }

    pub fn has_seen_setup(&self) -> bool {
        self.has_seen_setup
    }

    pub fn finish_type(&self) -> Option<FinishType> {
        self.finish_type
    }

    /// Finished-page message, if the flow ended with a known outcome.
    pub fn finished_message(&self) -> Option<&'static str> {
        self.finish_type.map(FinishType::message)
    }

    /// Outcome for this flow given whether the rider created an account.
    pub fn finish_type_for(&self, created_account: bool) -> FinishType {
        match (self.kind, created_account) {
            (FlowKind::GettingStarted, false) => FinishType::InitialSetupSkippedAccount,
            (FlowKind::GettingStarted, true) => FinishType::InitialSetupCreatedAccount,
            (FlowKind::CreateProfile, false) => FinishType::CreateAccountSkippedAccount,
            (FlowKind::CreateProfile, true) => FinishType::CreatedAccountCreatedAccount,
        }
    }

    /// Advance one page; past the last page this is `done`.
    pub fn next(&mut self) -> SetupPage {
        if self.current + 1 >= self.kind.pages().len() {
            self.done(None);
        } else {
            self.current += 1;
        }
        self.current_page()
    }

    /// Go back one page; a no-op on the first page.
    pub fn previous(&mut self) -> SetupPage {
        self.current = self.current.saturating_sub(1);
        self.current_page()
    }

    /// Mark setup seen and jump to the last page.
    pub fn done(&mut self, finish_type: Option<FinishType>) -> SetupPage {
        self.has_seen_setup = true;
        if finish_type.is_some() {
            self.finish_type = finish_type;
        }
        self.current = self.kind.pages().len() - 1;
        tracing::debug!(flow = ?self.kind, finish = ?self.finish_type, "Setup flow done");
        self.current_page()
    }
}
