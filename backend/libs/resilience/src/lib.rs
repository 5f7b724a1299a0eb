/// Resilience patterns for the social core
///
/// Every operation exposed to the request layer accepts a `Deadline`. Store
/// calls run through `with_deadline`, which enforces the remaining budget and
/// classifies expiry as `TimeoutError::Elapsed`.
///
/// # Example: Database Query with a Deadline
///
/// ```rust,no_run
/// use resilience::{with_deadline, Deadline};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let deadline = Deadline::after(Duration::from_secs(2));
///
///     let result = with_deadline(deadline, "load_profile", async {
///         // Your database query
///         Ok::<_, String>(())
///     })
///     .await;
/// }
/// ```
pub mod timeout;

pub use timeout::{with_deadline, Deadline, TimeoutError, DEFAULT_OPERATION_BUDGET};
