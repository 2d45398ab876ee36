//! Dispatch domain module: moving stock from the store to a site.
//!
//! A dispatch carries lines; security hands lines out (debiting inventory),
//! which splits or merges lines, and site staff later return or consume what
//! was handed out. Pure logic only; the infrastructure layer performs the
//! inventory debit/credit in the same transaction.

pub mod dispatch;
pub mod handout;
pub mod line;
pub mod returns;

pub use dispatch::{Dispatch, DispatchStatus, HandoutResult};
pub use handout::{HandoutChange, HandoutKind, LineArena, MergeKey};
pub use line::{DispatchItem, DispatchLine, LineState};
pub use returns::{available_to_return, ReturnOutcome, ReturnRecord, ReturnRequest};
