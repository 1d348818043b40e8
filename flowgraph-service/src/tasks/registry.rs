// Task Registry
// Maps tool/task identifiers to task constructors

use super::builtin::{JoinTask, MaximumTask, MinimumTask, MuxTask, NopTask, VerifyTask};
use super::Task;
use crate::error::{ServiceError, ServiceResult};
use crate::flowgraph::TaskRef;

use std::collections::HashMap;
use std::sync::Arc;

/// Constructor for a task implementation
pub type TaskFactory = Arc<dyn Fn() -> Arc<dyn Task> + Send + Sync>;

/// Registry of task implementations keyed by `tool/task`
#[derive(Clone, Default)]
pub struct TaskRegistry {
    factories: HashMap<String, TaskFactory>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the builtin selection tasks
    pub fn with_builtins() -> Self {
        Self::new()
            .with_task::<NopTask>()
            .with_task::<JoinTask>()
            .with_task::<MinimumTask>()
            .with_task::<MaximumTask>()
            .with_task::<MuxTask>()
            .with_task::<VerifyTask>()
    }

    /// Register a task type under its own `tool/task` name
    pub fn with_task<T: Task + Default + 'static>(mut self) -> Self {
        self.register_task::<T>();
        self
    }

    pub fn register_task<T: Task + Default + 'static>(&mut self) {
        let name = T::default().task_name();
        self.register(name, || Arc::new(T::default()) as Arc<dyn Task>);
    }

    /// Register a constructor, replacing any previous one for the identifier
    pub fn register<F>(&mut self, identifier: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Task> + Send + Sync + 'static,
    {
        self.factories.insert(identifier.into(), Arc::new(factory));
    }

    pub fn contains(&self, task: &TaskRef) -> bool {
        self.factories.contains_key(&task.identifier())
    }

    /// Registered identifiers, sorted
    pub fn identifiers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct the task bound to a reference
    pub fn resolve(&self, task: &TaskRef) -> ServiceResult<Arc<dyn Task>> {
        let identifier = task.identifier();
        self.factories
            .get(&identifier)
            .map(|factory| factory())
            .ok_or(ServiceError::UnknownTask(identifier))
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.identifiers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::NodeContext;
    use crate::tasks::TaskError;
    use async_trait::async_trait;

    struct EchoTask;

    #[async_trait]
    impl Task for EchoTask {
        fn tool(&self) -> &str {
            "shell"
        }

        fn task(&self) -> &str {
            "echo"
        }

        async fn run(&self, _ctx: &NodeContext) -> Result<i32, TaskError> {
            Ok(0)
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = TaskRegistry::with_builtins();
        assert_eq!(
            registry.identifiers(),
            vec![
                "builtin/join",
                "builtin/maximum",
                "builtin/minimum",
                "builtin/mux",
                "builtin/nop",
                "builtin/verify",
            ]
        );

        let task = registry.resolve(&TaskRef::from("builtin/minimum")).unwrap();
        assert_eq!(task.task_name(), "builtin/minimum");
        assert!(task.is_builtin());
        assert!(!task.merges_inputs());
    }

    #[test]
    fn test_register_custom_task() {
        let mut registry = TaskRegistry::new();
        registry.register("shell/echo", || Arc::new(EchoTask) as Arc<dyn Task>);

        assert!(registry.contains(&TaskRef::new("shell", "echo")));
        let task = registry.resolve(&TaskRef::new("shell", "echo")).unwrap();
        assert!(!task.is_builtin());
        assert!(task.merges_inputs());
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = TaskRegistry::with_builtins();
        match registry.resolve(&TaskRef::from("yosys/syn")) {
            Err(ServiceError::UnknownTask(name)) => assert_eq!(name, "yosys/syn"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(task) => panic!("resolved {}", task.task_name()),
        }
    }
}
