use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::expr::{ConstantValue, LogicalVariable};

/// Variables known to be equal, optionally anchored to a constant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EquivalenceClass {
    members: Vec<LogicalVariable>,
    representative: LogicalVariable,
    constant: Option<ConstantValue>,
}

impl EquivalenceClass {
    fn new(members: Vec<LogicalVariable>, constant: Option<ConstantValue>) -> Self {
        Self {
            representative: members[0],
            members,
            constant,
        }
    }

    pub fn members(&self) -> &[LogicalVariable] {
        &self.members
    }

    /// The variable standing for the whole class.
    pub fn representative(&self) -> LogicalVariable {
        self.representative
    }

    pub fn constant(&self) -> Option<&ConstantValue> {
        self.constant.as_ref()
    }

    pub fn is_constant(&self) -> bool {
        self.constant.is_some()
    }

    pub fn contains(&self, v: LogicalVariable) -> bool {
        self.members.contains(&v)
    }
}

impl Display for EquivalenceClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.members.iter().join(", "))?;
        if let Some(c) = &self.constant {
            write!(f, " = {}", c)?;
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassId(usize);

/// Variable to equivalence class mapping.
///
/// Classes live in an arena; an absorbed class leaves a tombstone. Merging repoints every
/// variable of the absorbed class with a full rescan of the mapping, there is no path
/// compression.
#[derive(Clone, Debug, Default)]
pub struct EquivalenceClassMap {
    classes: Vec<Option<EquivalenceClass>>,
    by_var: HashMap<LogicalVariable, ClassId>,
}

impl EquivalenceClassMap {
    pub fn is_empty(&self) -> bool {
        self.by_var.is_empty()
    }

    pub fn class_id(&self, v: LogicalVariable) -> Option<ClassId> {
        self.by_var.get(&v).copied()
    }

    pub fn class_of(&self, v: LogicalVariable) -> Option<&EquivalenceClass> {
        self.class_id(v).and_then(|id| self.classes[id.0].as_ref())
    }

    /// Whether both variables are the same variable or belong to one class.
    pub fn equivalent(&self, a: LogicalVariable, b: LogicalVariable) -> bool {
        a == b
            || matches!((self.class_id(a), self.class_id(b)), (Some(x), Some(y)) if x == y)
    }

    /// Representative of `v`'s class, or `v` itself when it is unclassed.
    pub fn representative(&self, v: LogicalVariable) -> LogicalVariable {
        self.class_of(v).map(|c| c.representative()).unwrap_or(v)
    }

    pub fn classes(&self) -> impl Iterator<Item = &EquivalenceClass> {
        self.classes.iter().flatten()
    }

    fn add_class(&mut self, class: EquivalenceClass) -> ClassId {
        let id = ClassId(self.classes.len());
        for m in class.members() {
            self.by_var.insert(*m, id);
        }
        self.classes.push(Some(class));
        id
    }

    /// Records `a = b`.
    pub fn merge(&mut self, a: LogicalVariable, b: LogicalVariable) {
        match (self.class_id(a), self.class_id(b)) {
            (None, None) => {
                let members = if a == b { vec![a] } else { vec![a, b] };
                self.add_class(EquivalenceClass::new(members, None));
            }
            (Some(id), None) => self.extend_class(id, b),
            (None, Some(id)) => self.extend_class(id, a),
            (Some(x), Some(y)) if x == y => {}
            (Some(surviving), Some(absorbed)) => {
                let Some(absorbed_class) = self.classes[absorbed.0].take() else {
                    return;
                };
                if let Some(target) = self.classes[surviving.0].as_mut() {
                    for m in absorbed_class.members {
                        if !target.members.contains(&m) {
                            target.members.push(m);
                        }
                    }
                    // A conflicting constant keeps the surviving class's value.
                    if target.constant.is_none() {
                        target.constant = absorbed_class.constant;
                    }
                }
                for class_id in self.by_var.values_mut() {
                    if *class_id == absorbed {
                        *class_id = surviving;
                    }
                }
            }
        }
    }

    fn extend_class(&mut self, id: ClassId, v: LogicalVariable) {
        if let Some(class) = self.classes[id.0].as_mut() {
            class.members.push(v);
        }
        self.by_var.insert(v, id);
    }

    /// Records `v = constant`. When `v`'s class is already anchored to a different constant
    /// the new equality is dropped.
    pub fn set_constant(&mut self, v: LogicalVariable, constant: ConstantValue) {
        match self.class_id(v) {
            None => {
                self.add_class(EquivalenceClass::new(vec![v], Some(constant)));
            }
            Some(id) => {
                if let Some(class) = self.classes[id.0].as_mut() {
                    if class.constant.is_none() {
                        class.constant = Some(constant);
                    }
                }
            }
        }
    }

    /// Adds every class of `other` to this map, merging overlapping classes.
    pub fn absorb(&mut self, other: &EquivalenceClassMap) {
        for class in other.classes() {
            let first = class.members[0];
            for m in &class.members[1..] {
                self.merge(first, *m);
            }
            if class.members.len() == 1 && class.constant.is_none() {
                self.merge(first, first);
            }
            if let Some(c) = &class.constant {
                self.set_constant(first, c.clone());
            }
        }
    }

    /// Keeps only classes with at least one of `vars`, restricting members to `vars`.
    pub fn restrict_to(&self, vars: &[LogicalVariable]) -> EquivalenceClassMap {
        let mut restricted = EquivalenceClassMap::default();
        for class in self.classes() {
            let members: Vec<_> = class
                .members
                .iter()
                .copied()
                .filter(|m| vars.contains(m))
                .collect();
            if !members.is_empty() {
                restricted.add_class(EquivalenceClass::new(members, class.constant.clone()));
            }
        }
        restricted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(id: u32) -> LogicalVariable {
        LogicalVariable::new(id)
    }

    #[test]
    fn test_merge_is_transitive() {
        let mut map = EquivalenceClassMap::default();
        map.merge(v(1), v(2));
        map.merge(v(2), v(3));
        assert!(map.equivalent(v(1), v(3)));
        assert_eq!(1, map.classes().count());
        assert_eq!(v(1), map.representative(v(3)));

        let before = map.class_of(v(1)).cloned();
        map.merge(v(1), v(2));
        assert_eq!(before.as_ref(), map.class_of(v(1)));
    }

    #[test]
    fn test_merge_two_classes_repoints_members() {
        let mut map = EquivalenceClassMap::default();
        map.merge(v(1), v(2));
        map.merge(v(3), v(4));
        map.merge(v(2), v(4));
        assert_eq!(1, map.classes().count());
        for id in 1..=4 {
            assert_eq!(map.class_id(v(1)), map.class_id(v(id)));
        }
    }

    #[test]
    fn test_conflicting_constant_is_dropped() {
        let mut map = EquivalenceClassMap::default();
        map.set_constant(v(1), ConstantValue::Int64(5));
        map.set_constant(v(1), ConstantValue::Int64(6));
        assert_eq!(Some(&ConstantValue::Int64(5)), map.class_of(v(1)).unwrap().constant());
    }
}
