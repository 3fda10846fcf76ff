//! Shared helpers for kernel tests.

use crate::arch::NoOpArch;
use crate::kernel::Kernel;
use crate::task::TaskId;

pub(crate) type TestKernel = Kernel<NoOpArch>;

/// A kernel on the host port.
pub(crate) fn kernel(levels: usize, tasks: usize) -> TestKernel {
    Kernel::new(levels, tasks)
}

fn entry(_arg: usize) {}

/// Initialise and register a task at the given 1-indexed priority. The
/// stack top is a dummy; the host port builds no frame.
pub(crate) fn spawn(kernel: &TestKernel, priority: u8) -> TaskId {
    let id = kernel
        .initialise_task(0x2000_0000, entry, 0, priority)
        .expect("task arena full");
    kernel.register_task(id);
    id
}
