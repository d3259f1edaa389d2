//! Run an async function to completion from synchronous code

use std::future::Future;

use log::info;

use crate::error::ServiceError;

/// Run async function inside a new multi threaded tokio instance.
///
/// A probe that blocks a worker only holds up that worker, so the runtime needs more than one.
pub fn run_in_tokio<F, T>(my_function: F) -> F::Output
where
    F: Future<Output = Result<T, ServiceError>>,
{
    info!("starting Tokio");

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(my_function)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_output() {
        let value = run_in_tokio(async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            Ok(42)
        })
        .unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn propagates_errors() {
        let result: Result<(), _> = run_in_tokio(async {
            Err(ServiceError::Io(std::io::Error::other("boom")))
        });
        assert!(matches!(result, Err(ServiceError::Io(_))));
    }
}
