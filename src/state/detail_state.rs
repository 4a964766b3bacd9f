//! Detail navigation state machine
//!
//! The directory portal tracks which record and which tab a session is looking
//! at, so a record's detail pages must be visited in one fixed sequence:
//! open the detail context, then fetch the four tabs in [`DetailTab::ALL`] order.
//! [`DetailNavigator`] makes that order a checked state rather than a convention.

use std::fmt;
use thiserror::Error;

/// The four detail tabs of a record, in navigation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetailTab {
    Situation,
    Dossier,
    Diplomas,
    Personal,
}

impl DetailTab {
    /// Every tab in the order the portal expects them
    pub const ALL: [DetailTab; 4] = [
        DetailTab::Situation,
        DetailTab::Dossier,
        DetailTab::Diplomas,
        DetailTab::Personal,
    ];

    /// Name used in logs and as the JSON column prefix
    pub fn name(&self) -> &'static str {
        match self {
            Self::Situation => "situation",
            Self::Dossier => "dossier",
            Self::Diplomas => "diplomas",
            Self::Personal => "personal",
        }
    }

    /// Position of the tab within [`DetailTab::ALL`]
    pub fn index(&self) -> usize {
        match self {
            Self::Situation => 0,
            Self::Dossier => 1,
            Self::Diplomas => 2,
            Self::Personal => 3,
        }
    }
}

impl fmt::Display for DetailTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a record's detail navigation currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailStep {
    Idle,
    DetailOpened,
    TabFetched(DetailTab),
    Done,
}

/// Errors raised when detail navigation is driven out of order
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    #[error("detail context must be opened before fetching tabs (at {0:?})")]
    NotOpened(DetailStep),

    #[error("detail context already opened (at {0:?})")]
    AlreadyOpened(DetailStep),

    #[error("expected tab {expected:?}, got {got}")]
    OutOfOrder {
        expected: Option<DetailTab>,
        got: DetailTab,
    },

    #[error("detail navigation finished with {remaining} tab(s) left")]
    Incomplete { remaining: usize },
}

/// Enforces Idle -> DetailOpened -> TabFetched x4 -> Done
#[derive(Debug, Clone)]
pub struct DetailNavigator {
    step: DetailStep,
}

impl DetailNavigator {
    pub fn new() -> Self {
        Self {
            step: DetailStep::Idle,
        }
    }

    pub fn step(&self) -> DetailStep {
        self.step
    }

    /// Marks the detail context as opened
    pub fn open(&mut self) -> Result<(), NavigationError> {
        match self.step {
            DetailStep::Idle => {
                self.step = DetailStep::DetailOpened;
                Ok(())
            }
            other => Err(NavigationError::AlreadyOpened(other)),
        }
    }

    /// The tab that must be fetched next, if any
    pub fn next_tab(&self) -> Option<DetailTab> {
        match self.step {
            DetailStep::DetailOpened => Some(DetailTab::ALL[0]),
            DetailStep::TabFetched(tab) => DetailTab::ALL.get(tab.index() + 1).copied(),
            DetailStep::Idle | DetailStep::Done => None,
        }
    }

    /// Records that `tab` was visited; succeeds only for the expected tab
    ///
    /// A visit counts even when the tab content could not be fetched, since the
    /// portal has still moved on to that tab.
    pub fn record(&mut self, tab: DetailTab) -> Result<(), NavigationError> {
        if matches!(self.step, DetailStep::Idle) {
            return Err(NavigationError::NotOpened(self.step));
        }

        let expected = self.next_tab();
        if expected != Some(tab) {
            return Err(NavigationError::OutOfOrder { expected, got: tab });
        }

        self.step = DetailStep::TabFetched(tab);
        Ok(())
    }

    /// Closes navigation once every tab has been visited
    pub fn finish(&mut self) -> Result<(), NavigationError> {
        match self.step {
            DetailStep::TabFetched(DetailTab::Personal) => {
                self.step = DetailStep::Done;
                Ok(())
            }
            DetailStep::Done => Ok(()),
            DetailStep::Idle => Err(NavigationError::NotOpened(self.step)),
            DetailStep::DetailOpened => Err(NavigationError::Incomplete {
                remaining: DetailTab::ALL.len(),
            }),
            DetailStep::TabFetched(tab) => Err(NavigationError::Incomplete {
                remaining: DetailTab::ALL.len() - tab.index() - 1,
            }),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.step, DetailStep::Done)
    }
}

impl Default for DetailNavigator {
    fn default() -> Self {
        Self::new()
    }
}
