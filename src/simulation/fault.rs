/// A fault raised inside a scheduled task body.
///
/// Faults never escape the scheduler: the task boundary logs them and turns
/// them into a resample of the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskFault {
    /// A grid cell was addressed outside the `size × size` bounds.
    OutOfBounds { x: i64, y: i64, size: i32 },
    /// A previous task panicked while holding the simulation lock.
    Poisoned { task: &'static str },
    /// The task body itself panicked.
    Panicked { task: &'static str },
}

impl std::fmt::Display for TaskFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskFault::OutOfBounds { x, y, size } => {
                write!(f, "cell ({}, {}) outside {}x{} grid", x, y, size, size)
            }
            TaskFault::Poisoned { task } => {
                write!(f, "simulation lock poisoned before task '{}'", task)
            }
            TaskFault::Panicked { task } => write!(f, "task '{}' panicked", task),
        }
    }
}

impl std::error::Error for TaskFault {}
