/// Undo/redo stacks of snapshots taken before each edit.
///
/// The live state is owned by the caller; `undo` and `redo` take it by value
/// and hand back the state to restore.
#[derive(Clone, Debug)]
pub struct HistoryStack<T> {
    undo: Vec<T>,
    redo: Vec<T>,
}

impl<T> Default for HistoryStack<T> {
    fn default() -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
        }
    }
}

impl<T> HistoryStack<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the state preceding a new action. Invalidates redo.
    pub fn push(&mut self, before: T) {
        self.undo.push(before);
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Returns `Err(current)` untouched when there is nothing to undo.
    pub fn undo(&mut self, current: T) -> Result<T, T> {
        match self.undo.pop() {
            Some(previous) => {
                self.redo.push(current);
                Ok(previous)
            }
            None => Err(current),
        }
    }

    /// Returns `Err(current)` untouched when there is nothing to redo.
    pub fn redo(&mut self, current: T) -> Result<T, T> {
        match self.redo.pop() {
            Some(next) => {
                self.undo.push(current);
                Ok(next)
            }
            None => Err(current),
        }
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub fn depth(&self) -> (usize, usize) {
        (self.undo.len(), self.redo.len())
    }
}
