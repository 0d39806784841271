// Heap storage for environments and binding cells, plus the mark-sweep collector.
//
// Values refer to environments only through `EnvId`, so the `Rc` graph of values
// stays acyclic. Cycles such as a global binding holding a closure that captured the
// global environment go through the arenas and are reclaimed by `Heap::collect`.

use crate::runtime::environment::{Cell, Frame};
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::values::Value;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Handle to an environment frame. Carries a generation so that a handle to a
/// reclaimed frame is detected instead of aliasing whatever reused the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId {
    index: u32,
    generation: u32,
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index)
    }
}

/// Handle to a binding cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId {
    index: u32,
    generation: u32,
}

struct Slot<T> {
    generation: u32,
    marked: bool,
    entry: Option<T>,
}

struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    fn insert(&mut self, value: T) -> (u32, u32) {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(value);
            slot.marked = false;
            (index, slot.generation)
        } else {
            self.slots.push(Slot {
                generation: 0,
                marked: false,
                entry: Some(value),
            });
            ((self.slots.len() - 1) as u32, 0)
        }
    }

    fn get(&self, index: u32, generation: u32) -> Option<&T> {
        self.slots
            .get(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn get_mut(&mut self, index: u32, generation: u32) -> Option<&mut T> {
        self.slots
            .get_mut(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Marks a live slot. Returns true only the first time it is marked.
    fn mark(&mut self, index: u32, generation: u32) -> bool {
        match self.slots.get_mut(index as usize) {
            Some(slot) if slot.generation == generation && slot.entry.is_some() => {
                if slot.marked {
                    false
                } else {
                    slot.marked = true;
                    true
                }
            }
            _ => false,
        }
    }

    fn sweep(&mut self) -> usize {
        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.entry.is_none() {
                continue;
            }
            if slot.marked {
                slot.marked = false;
            } else {
                slot.entry = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                freed += 1;
            }
        }
        self.live -= freed;
        freed
    }
}

/// Root set handed to the collector at a safe point.
#[derive(Debug, Default, Clone)]
pub struct Roots {
    envs: Vec<EnvId>,
    values: Vec<Value>,
}

impl Roots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn env(mut self, env: EnvId) -> Self {
        self.envs.push(env);
        self
    }

    pub fn value(mut self, value: &Value) -> Self {
        self.values.push(value.clone());
        self
    }

    pub fn values<'a, I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        self.values.extend(values.into_iter().cloned());
        self
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    pub frames_freed: usize,
    pub cells_freed: usize,
}

/// Arena-backed storage for every environment frame and binding cell of one evaluator.
pub struct Heap {
    frames: Arena<Frame>,
    cells: Arena<Cell>,
    global: EnvId,
}

impl Heap {
    /// Creates a heap holding only the (empty) global environment.
    pub fn new() -> Self {
        let mut frames = Arena::new();
        let (index, generation) = frames.insert(Frame::new(None));
        Heap {
            frames,
            cells: Arena::new(),
            global: EnvId { index, generation },
        }
    }

    pub fn global(&self) -> EnvId {
        self.global
    }

    pub(crate) fn alloc_frame(&mut self, parent: Option<EnvId>) -> EnvId {
        let (index, generation) = self.frames.insert(Frame::new(parent));
        EnvId { index, generation }
    }

    pub(crate) fn frame(&self, id: EnvId) -> RuntimeResult<&Frame> {
        self.frames
            .get(id.index, id.generation)
            .ok_or_else(|| RuntimeError::StaleHandle(format!("environment {}", id)))
    }

    pub(crate) fn frame_mut(&mut self, id: EnvId) -> RuntimeResult<&mut Frame> {
        self.frames
            .get_mut(id.index, id.generation)
            .ok_or_else(|| RuntimeError::StaleHandle(format!("environment {}", id)))
    }

    pub(crate) fn alloc_cell(&mut self, cell: Cell) -> CellId {
        let (index, generation) = self.cells.insert(cell);
        CellId { index, generation }
    }

    pub fn cell(&self, id: CellId) -> RuntimeResult<&Cell> {
        self.cells
            .get(id.index, id.generation)
            .ok_or_else(|| RuntimeError::StaleHandle(format!("binding cell {}", id.index)))
    }

    pub(crate) fn cell_mut(&mut self, id: CellId) -> RuntimeResult<&mut Cell> {
        self.cells
            .get_mut(id.index, id.generation)
            .ok_or_else(|| RuntimeError::StaleHandle(format!("binding cell {}", id.index)))
    }

    pub fn live_frames(&self) -> usize {
        self.frames.live
    }

    pub fn live_cells(&self) -> usize {
        self.cells.live
    }

    /// Reclaims every frame and cell not reachable from `roots` or the global environment.
    pub fn collect(&mut self, roots: &Roots) -> CollectStats {
        let mut env_work: Vec<EnvId> = roots.envs.clone();
        env_work.push(self.global);
        let mut value_work: Vec<Value> = roots.values.clone();
        let mut visited: HashSet<*const ()> = HashSet::new();

        loop {
            if let Some(value) = value_work.pop() {
                trace_value(&value, &mut visited, &mut env_work, &mut value_work);
                continue;
            }
            let Some(env) = env_work.pop() else {
                break;
            };
            if !self.frames.mark(env.index, env.generation) {
                continue;
            }
            let Some(frame) = self.frames.get(env.index, env.generation) else {
                continue;
            };
            if let Some(parent) = frame.parent {
                env_work.push(parent);
            }
            for cell_id in frame.bindings.values() {
                if self.cells.mark(cell_id.index, cell_id.generation) {
                    if let Some(cell) = self.cells.get(cell_id.index, cell_id.generation) {
                        value_work.push(cell.value.clone());
                    }
                }
            }
        }

        let stats = CollectStats {
            frames_freed: self.frames.sweep(),
            cells_freed: self.cells.sweep(),
        };
        debug!(
            frames_freed = stats.frames_freed,
            cells_freed = stats.cells_freed,
            live_frames = self.frames.live,
            live_cells = self.cells.live,
            "collected heap"
        );
        stats
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

/// Pushes the children of `value`. Pairs and lambdas are shared freely, so each one
/// is traced once per collection.
fn trace_value(
    value: &Value,
    visited: &mut HashSet<*const ()>,
    envs: &mut Vec<EnvId>,
    values: &mut Vec<Value>,
) {
    match value {
        Value::Pair(p) => {
            if !visited.insert(Rc::as_ptr(p) as *const ()) {
                return;
            }
            values.push(p.head.clone());
            values.push(p.tail.clone());
        }
        Value::Environment(id) => envs.push(*id),
        Value::Closure(l) | Value::Macro(l) => {
            if !visited.insert(Rc::as_ptr(l) as *const ()) {
                return;
            }
            envs.push(l.env);
            values.push(l.params.clone());
            values.push(l.body.clone());
        }
        _ => {}
    }
}
