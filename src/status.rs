use std::fmt;

use crate::machine::{ActionState, Parked};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Idle,
    Pending,
    Success,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Pending => "pending",
            Status::Success => "success",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of an executor, as a UI binding would render it.
///
/// `data` is only set for `Success` and for optimistic `Pending`; `error` only
/// for `Error`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot<T, E> {
    pub status: Status,
    pub data: Option<T>,
    pub error: Option<E>,
    pub is_pending: bool,
    pub is_optimistic: bool,
    pub is_success: bool,
    pub is_error: bool,
}

impl<T, E> StatusSnapshot<T, E> {
    pub fn idle() -> Self {
        Self {
            status: Status::Idle,
            data: None,
            error: None,
            is_pending: false,
            is_optimistic: false,
            is_success: false,
            is_error: false,
        }
    }

    pub fn pending() -> Self {
        Self {
            status: Status::Pending,
            is_pending: true,
            ..Self::idle()
        }
    }

    pub fn optimistic(data: T) -> Self {
        Self {
            status: Status::Pending,
            data: Some(data),
            is_pending: true,
            is_optimistic: true,
            ..Self::idle()
        }
    }

    pub fn success(data: T) -> Self {
        Self {
            status: Status::Success,
            data: Some(data),
            is_success: true,
            ..Self::idle()
        }
    }

    pub fn error(error: E) -> Self {
        Self {
            status: Status::Error,
            error: Some(error),
            is_error: true,
            ..Self::idle()
        }
    }
}

/// Project the state onto a [`StatusSnapshot`].
///
/// Precedence matters: an optimistic value is only reported as such while a
/// call is executing. Once it settles, the status follows the committed
/// result alone.
pub fn project<T: Clone, E: Clone>(state: &ActionState<T, E>) -> StatusSnapshot<T, E> {
    let result = state.result();
    let executing = state.is_executing();

    match (executing, state.parked(), &result.data) {
        (true, Parked::Empty, _) => StatusSnapshot::pending(),
        (true, Parked::Filled(_), Some(data)) => StatusSnapshot::optimistic(data.clone()),
        (false, _, Some(data)) if !result.is_error => StatusSnapshot::success(data.clone()),
        (false, _, _) if result.is_error => match &result.error {
            Some(error) => StatusSnapshot::error(error.clone()),
            None => StatusSnapshot::idle(),
        },
        _ => StatusSnapshot::idle(),
    }
}
