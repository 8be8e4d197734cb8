use crate::chain::{Interceptor, Invocation};
use crate::error::DispatchError;

/// Binds raw input onto the schema before anything inner runs. A
/// rejected call never reaches the callable or any inner layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationInterceptor;

impl Interceptor for ValidationInterceptor {
    fn name(&self) -> &str {
        "validation"
    }

    fn before(&self, call: &mut Invocation) -> Result<(), DispatchError> {
        call.bind_args()
    }
}
