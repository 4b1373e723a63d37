use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use futures::{
    FutureExt as _,
    future::{BoxFuture, Shared},
};
use tokio::sync::Mutex;

use crate::{
    canvas::Canvas,
    dimension::Dimension,
    error::{ForgeError, ForgeResult},
    loader::ImageLoader,
    op::{CanvasOp, Context, DependencyHandle},
};

/// Reports one entry's evaluation failure: `(path, message)`.
pub type FailureHandler = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// The outcome an entry task settles to; `None` means the failure was
/// already routed through the failure handler.
type EntryResult = Option<Arc<Canvas>>;
type EntryTask = Shared<BoxFuture<'static, EntryResult>>;

#[derive(Default)]
struct DispatchState {
    tasks: HashMap<String, EntryTask>,
    /// Adjacency set of declared named-entry dependencies, discovered lazily
    /// as each task reaches its dependency nodes.
    edges: HashMap<String, HashSet<String>>,
}

impl DispatchState {
    fn transitively_depends_on(&self, from: &str, needle: &str) -> bool {
        self.edges.get(from).is_some_and(|deps| {
            deps.contains(needle)
                || deps
                    .iter()
                    .any(|next| self.transitively_depends_on(next, needle))
        })
    }
}

/// Schedules one concurrent task per named entry and resolves late-declared
/// dependencies between them. The task map and edge set share one lock,
/// held only for check-and-insert, never across an await; a cycle is
/// rejected synchronously when its closing edge is declared, so it can
/// never deadlock.
pub struct OpDispatcher {
    state: Arc<Mutex<DispatchState>>,
}

impl OpDispatcher {
    /// Spawns every entry's evaluation. The lock is held until all tasks are
    /// inserted, so a dependency declaration always sees the complete map.
    #[tracing::instrument(skip_all, fields(entries = entries.len()))]
    pub async fn dispatch(
        default_width: u32,
        default_height: u32,
        entries: BTreeMap<String, CanvasOp>,
        images: Arc<ImageLoader>,
        on_failure: FailureHandler,
    ) -> OpDispatcher {
        let state = Arc::new(Mutex::new(DispatchState::default()));
        let mut guard = state.lock().await;
        for (path, op) in entries {
            let ctx = Context {
                images: images.clone(),
                deps: Arc::new(EntryHandle {
                    state: state.clone(),
                    entry: path.clone(),
                }),
            };
            let handler = on_failure.clone();
            let entry_path = path.clone();
            let handle = tokio::spawn(async move {
                match op
                    .run(
                        &ctx,
                        Dimension::of(default_width),
                        Dimension::of(default_height),
                    )
                    .await
                {
                    Ok(canvas) => Some(canvas),
                    Err(err) => {
                        handler(&entry_path, &err.to_string());
                        None
                    }
                }
            });

            let handler = on_failure.clone();
            let entry_path = path.clone();
            let task = async move {
                handle.await.unwrap_or_else(|err| {
                    handler(
                        &entry_path,
                        &format!("unexpected fault during evaluation: {err}"),
                    );
                    None
                })
            }
            .boxed()
            .shared();
            guard.tasks.insert(path, task);
        }
        drop(guard);
        OpDispatcher { state }
    }

    /// Awaits every entry; failure of one never blocks or cancels another.
    pub async fn await_all(&self) -> BTreeMap<String, Option<Arc<Canvas>>> {
        let tasks: Vec<(String, EntryTask)> = {
            let state = self.state.lock().await;
            state
                .tasks
                .iter()
                .map(|(path, task)| (path.clone(), task.clone()))
                .collect()
        };
        futures::future::join_all(
            tasks
                .into_iter()
                .map(|(path, task)| async move { (path, task.await) }),
        )
        .await
        .into_iter()
        .collect()
    }
}

/// Dependency capability bound to one owning entry.
struct EntryHandle {
    state: Arc<Mutex<DispatchState>>,
    entry: String,
}

impl DependencyHandle for EntryHandle {
    fn depend_on<'a>(&'a self, target: &'a str) -> BoxFuture<'a, ForgeResult<Arc<Canvas>>> {
        async move {
            let task = {
                let mut state = self.state.lock().await;
                if !state.tasks.contains_key(&self.entry) {
                    return Err(unknown_entry(&self.entry));
                }
                let task = match state.tasks.get(target) {
                    Some(task) => task.clone(),
                    None => return Err(unknown_entry(target)),
                };
                if self.entry == target {
                    return Err(ForgeError::dependency(format!(
                        "entry '{target}' depending on itself"
                    )));
                }
                // Searching from the new dependency back toward the
                // dependent catches the cycle on its closing edge, before
                // anything can block on it.
                if state.transitively_depends_on(target, &self.entry) {
                    return Err(ForgeError::dependency(format!(
                        "cyclic dependency detected between entry '{}' and '{target}'",
                        self.entry
                    )));
                }
                state
                    .edges
                    .entry(self.entry.clone())
                    .or_default()
                    .insert(target.to_string());
                task
            };
            task.await
                .ok_or_else(|| ForgeError::dependency("one or more dependency failed"))
        }
        .boxed()
    }
}

fn unknown_entry(name: &str) -> ForgeError {
    ForgeError::dependency(format!("invalid dependency: no entry named '{name}'"))
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex as SyncMutex;

    use super::*;
    use crate::color::Color;

    type Failures = Arc<SyncMutex<Vec<(String, String)>>>;

    fn collector() -> (Failures, FailureHandler) {
        let failures: Failures = Arc::default();
        let sink = failures.clone();
        let handler: FailureHandler = Arc::new(move |path, err| {
            sink.lock().push((path.to_string(), err.to_string()));
        });
        (failures, handler)
    }

    fn fill() -> CanvasOp {
        CanvasOp::Fill {
            color: Color::WHITE,
            width: Dimension::AUTO,
            height: Dimension::AUTO,
        }
    }

    fn depend(path: &str) -> CanvasOp {
        CanvasOp::Dependency { path: path.into() }
    }

    fn tinted_dep(path: &str) -> CanvasOp {
        CanvasOp::Tint {
            target: Box::new(depend(path)),
            color: Color::rgb(128, 128, 128),
        }
    }

    async fn dispatch(entries: Vec<(&str, CanvasOp)>) -> (BTreeMap<String, Option<Arc<Canvas>>>, Failures) {
        let (failures, handler) = collector();
        let dispatcher = OpDispatcher::dispatch(
            8,
            8,
            entries
                .into_iter()
                .map(|(path, op)| (path.to_string(), op))
                .collect(),
            Arc::new(ImageLoader::new("nonexistent-texture-root")),
            handler,
        )
        .await;
        (dispatcher.await_all().await, failures)
    }

    #[tokio::test]
    async fn independent_entries_all_complete() {
        let (results, failures) = dispatch(vec![("a", fill()), ("b", fill()), ("c", fill())]).await;
        assert_eq!(results.len(), 3);
        assert!(results.values().all(|r| r.is_some()));
        assert!(failures.lock().is_empty());
    }

    #[tokio::test]
    async fn dependency_chain_resolves() {
        let (results, failures) =
            dispatch(vec![("base", fill()), ("mid", tinted_dep("base")), ("top", tinted_dep("mid"))])
                .await;
        assert!(results.values().all(|r| r.is_some()));
        assert!(failures.lock().is_empty());
        // White through one 50% tint, then another: 255 -> 128 -> 64.
        let top = results["top"].as_ref().unwrap();
        assert_eq!(top.get(0, 0), Color::from_argb(255, 64, 64, 64));
    }

    #[tokio::test]
    async fn two_cycle_fails_both_entries() {
        let (results, failures) = dispatch(vec![("a", depend("b")), ("b", depend("a"))]).await;
        assert!(results["a"].is_none());
        assert!(results["b"].is_none());
        let failures = failures.lock();
        assert!(
            failures
                .iter()
                .any(|(_, msg)| msg.contains("cyclic dependency detected"))
        );
        // Both entries end up reported: one with the cycle, the other with
        // the generic upstream failure.
        assert_eq!(failures.len(), 2);
    }

    #[tokio::test]
    async fn three_cycle_fails_on_closing_edge() {
        let (results, failures) =
            dispatch(vec![("a", depend("b")), ("b", depend("c")), ("c", depend("a"))]).await;
        assert!(results.values().all(|r| r.is_none()));
        assert!(
            failures
                .lock()
                .iter()
                .any(|(_, msg)| msg.contains("cyclic dependency detected"))
        );
    }

    #[tokio::test]
    async fn self_dependency_fails_without_deadlock() {
        let (results, failures) = dispatch(vec![("a", depend("a"))]).await;
        assert!(results["a"].is_none());
        assert!(
            failures
                .lock()
                .iter()
                .any(|(path, msg)| path == "a" && msg.contains("depending on itself"))
        );
    }

    #[tokio::test]
    async fn unknown_target_is_reported() {
        let (results, failures) = dispatch(vec![("a", depend("ghost"))]).await;
        assert!(results["a"].is_none());
        assert!(
            failures
                .lock()
                .iter()
                .any(|(_, msg)| msg.contains("no entry named 'ghost'"))
        );
    }

    #[tokio::test]
    async fn upstream_failure_is_generic_and_isolated() {
        let (results, failures) = dispatch(vec![
            ("broken", CanvasOp::RawImage { path: "missing".into() }),
            ("wants_broken", depend("broken")),
            ("independent", fill()),
        ])
        .await;
        assert!(results["broken"].is_none());
        assert!(results["wants_broken"].is_none());
        assert!(results["independent"].is_some());

        let failures = failures.lock();
        let broken = failures.iter().find(|(p, _)| p == "broken").unwrap();
        assert!(broken.1.contains("no image at path"));
        let dependent = failures.iter().find(|(p, _)| p == "wants_broken").unwrap();
        // Detail is not forwarded; the target already reported it.
        assert!(dependent.1.contains("one or more dependency failed"));
        assert!(!dependent.1.contains("no image at path"));
    }

    #[tokio::test]
    async fn diamond_dependencies_share_the_same_result() {
        let (results, failures) = dispatch(vec![
            ("root", fill()),
            ("left", tinted_dep("root")),
            ("right", tinted_dep("root")),
            (
                "join",
                CanvasOp::Layer {
                    entries: vec![
                        crate::op::LayerEntry {
                            op: depend("left"),
                            x_offset: 0,
                            y_offset: 0,
                        },
                        crate::op::LayerEntry {
                            op: depend("right"),
                            x_offset: 0,
                            y_offset: 0,
                        },
                    ],
                    width: Dimension::AUTO,
                    height: Dimension::AUTO,
                    equation: crate::blend::BlendEquation::Add,
                    src_color: crate::blend::BlendFactor::SrcAlpha,
                    dst_color: crate::blend::BlendFactor::OneMinusSrcAlpha,
                    src_alpha: crate::blend::BlendFactor::SrcAlpha,
                    dst_alpha: crate::blend::BlendFactor::OneMinusSrcAlpha,
                },
            ),
        ])
        .await;
        assert!(failures.lock().is_empty());
        assert!(results.values().all(|r| r.is_some()));
    }
}
