use anyhow::Result;
use async_trait::async_trait;

use crate::task_manager::TaskManager;

/// Base trait for providers that can create components asynchronously.
///
/// Enables dependency injection with async initialization support.
#[async_trait]
pub trait AsyncProvider<T> {
    async fn provide(&self) -> Result<T>;
}

/// Trait for services started through the [`TaskManager`].
///
/// Carries startup priority and a criticality classification so the
/// orchestrator can degrade gracefully when an optional service fails.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Spawns the service's tasks into the task manager.
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    /// Service name for logging and management.
    fn name(&self) -> &'static str;

    /// Startup priority; higher numbers start first.
    fn priority(&self) -> i32 {
        0
    }

    /// Whether a start failure must abort the whole daemon.
    fn is_critical(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    struct CountingProvider {
        calls: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl AsyncProvider<String> for CountingProvider {
        async fn provide(&self) -> Result<String> {
            *self.calls.lock().unwrap() += 1;
            Ok("component".to_string())
        }
    }

    struct StubService {
        name: &'static str,
        priority: i32,
        critical: bool,
        fail: bool,
    }

    #[async_trait]
    impl ServiceProvider for StubService {
        async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
            if self.fail {
                return Err(anyhow!("{} refused to start", self.name));
            }
            task_manager.spawn_task(self.name.to_string(), |token| async move {
                token.cancelled().await;
                Ok(())
            });
            Ok(())
        }

        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn is_critical(&self) -> bool {
            self.critical
        }
    }

    #[tokio::test]
    async fn provider_is_reusable() {
        let calls = Arc::new(Mutex::new(0));
        let provider = CountingProvider {
            calls: calls.clone(),
        };

        for _ in 0..3 {
            assert_eq!(provider.provide().await.expect("provide"), "component");
        }
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn services_sort_by_descending_priority() {
        let mut services: Vec<Box<dyn ServiceProvider>> = vec![
            Box::new(StubService {
                name: "low",
                priority: 1,
                critical: false,
                fail: false,
            }),
            Box::new(StubService {
                name: "high",
                priority: 10,
                critical: true,
                fail: false,
            }),
            Box::new(StubService {
                name: "mid",
                priority: 5,
                critical: false,
                fail: false,
            }),
        ];

        services.sort_by_key(|s| std::cmp::Reverse(s.priority()));
        let names: Vec<_> = services.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn start_spawns_into_the_task_manager() {
        let mut task_manager = TaskManager::new();
        let service = StubService {
            name: "svc",
            priority: 0,
            critical: false,
            fail: false,
        };

        service.start(&mut task_manager).await.expect("start");
        assert!(task_manager.is_running("svc"));
        task_manager.shutdown_all().await.expect("shutdown");
    }

    #[tokio::test]
    async fn failing_start_propagates() {
        let mut task_manager = TaskManager::new();
        let service = StubService {
            name: "broken",
            priority: 0,
            critical: true,
            fail: true,
        };

        assert!(service.start(&mut task_manager).await.is_err());
        assert_eq!(task_manager.active_count(), 0);
    }
}
