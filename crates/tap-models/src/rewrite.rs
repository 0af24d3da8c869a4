//! Synchronized batch-norm removal
//!
//! Synchronized and plain batch normalization compute the same function at
//! inference time; only their training-time statistics aggregation differs.
//! Deployable models therefore carry plain batch-norm leaves only.

use crate::module::Module;
use tap_types::Result;

/// Return a new tree in which every synchronized batch-norm leaf is replaced
/// by a plain batch-norm leaf.
///
/// The replacement keeps num_features, eps, momentum and the affine flag, and
/// receives copies (fresh storage, not aliases) of the running statistics and,
/// when affine, of the scale and shift. Every other node is rebuilt with the
/// same kind, parameters and child names, its children rewritten recursively.
/// The input is not modified; rewriting an already plain tree yields an
/// equivalent tree.
pub fn convert_sync_batch_norm(module: &Module) -> Result<Module> {
    match module {
        Module::SyncBatchNorm(bn) => Ok(Module::BatchNorm(bn.detached_copy()?)),
        Module::BatchNorm(bn) => Ok(Module::BatchNorm(bn.clone())),
        Module::Block(block) => Ok(Module::Block(
            block.try_map_children(convert_sync_batch_norm)?,
        )),
    }
}
