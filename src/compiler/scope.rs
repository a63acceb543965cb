/// Most locals that may be live at once.
pub const MAX_LOCALS: usize = 200;

#[derive(Debug)]
struct Local {
    name: String,
    slot: u16,
    level: usize,
}

/// Compile-time scope stack. Locals resolve to fixed operand-stack slots so
/// the VM never looks names up for them; anything not found here is a
/// global.
#[derive(Debug, Default)]
pub(crate) struct Scope {
    locals: Vec<Local>,
    level: usize,
}

impl Scope {
    pub(crate) fn enter(&mut self) {
        self.level += 1;
    }

    /// Close the innermost block, returning how many locals it owned.
    pub(crate) fn leave(&mut self) -> usize {
        let keep = self
            .locals
            .iter()
            .rposition(|l| l.level < self.level)
            .map_or(0, |i| i + 1);
        let dropped = self.locals.len() - keep;
        self.locals.truncate(keep);
        self.level = self.level.saturating_sub(1);
        dropped
    }

    /// Bind `name` to `slot` in the innermost block. Returns `false` when
    /// the local limit is reached.
    pub(crate) fn declare(&mut self, name: &str, slot: u16) -> bool {
        if self.locals.len() >= MAX_LOCALS {
            return false;
        }
        self.locals.push(Local { name: name.to_string(), slot, level: self.level });
        true
    }

    /// Innermost binding wins.
    pub(crate) fn resolve(&self, name: &str) -> Option<u16> {
        self.locals.iter().rev().find(|l| l.name == name).map(|l| l.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_binding_shadows_outer() {
        let mut scope = Scope::default();
        assert!(scope.declare("x", 0));
        scope.enter();
        assert!(scope.declare("x", 1));
        assert_eq!(scope.resolve("x"), Some(1));
        assert_eq!(scope.leave(), 1);
        assert_eq!(scope.resolve("x"), Some(0));
    }

    #[test]
    fn unknown_names_fall_through() {
        let scope = Scope::default();
        assert_eq!(scope.resolve("print"), None);
    }

    #[test]
    fn leave_counts_only_innermost_block() {
        let mut scope = Scope::default();
        scope.declare("a", 0);
        scope.enter();
        scope.declare("b", 1);
        scope.enter();
        assert_eq!(scope.leave(), 0);
        assert_eq!(scope.leave(), 1);
        assert_eq!(scope.resolve("b"), None);
        assert_eq!(scope.resolve("a"), Some(0));
    }

    #[test]
    fn local_limit() {
        let mut scope = Scope::default();
        for i in 0..MAX_LOCALS {
            assert!(scope.declare("v", i as u16));
        }
        assert!(!scope.declare("overflow", 0));
    }
}
