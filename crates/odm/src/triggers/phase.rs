use std::fmt;

/// Lifecycle point a trigger is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerPhase {
    BeforeSave,
    AfterSave,
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    /// Field-level transform run at the start of every save
    Validator,
}

impl TriggerPhase {
    pub const ALL: [TriggerPhase; 9] = [
        TriggerPhase::BeforeSave,
        TriggerPhase::AfterSave,
        TriggerPhase::BeforeCreate,
        TriggerPhase::AfterCreate,
        TriggerPhase::BeforeUpdate,
        TriggerPhase::AfterUpdate,
        TriggerPhase::BeforeDelete,
        TriggerPhase::AfterDelete,
        TriggerPhase::Validator,
    ];

    /// Parent phase in the phase hierarchy
    pub fn parent(&self) -> Option<TriggerPhase> {
        match self {
            TriggerPhase::Validator => Some(TriggerPhase::BeforeSave),
            _ => None,
        }
    }

    /// Polymorphic phase match: a phase is-a itself and every ancestor
    pub fn is_a(&self, query: TriggerPhase) -> bool {
        let mut current = Some(*self);
        while let Some(phase) = current {
            if phase == query {
                return true;
            }
            current = phase.parent();
        }
        false
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerPhase::BeforeSave => "before_save",
            TriggerPhase::AfterSave => "after_save",
            TriggerPhase::BeforeCreate => "before_create",
            TriggerPhase::AfterCreate => "after_create",
            TriggerPhase::BeforeUpdate => "before_update",
            TriggerPhase::AfterUpdate => "after_update",
            TriggerPhase::BeforeDelete => "before_delete",
            TriggerPhase::AfterDelete => "after_delete",
            TriggerPhase::Validator => "validator",
        }
    }
}

impl fmt::Display for TriggerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerPhase::ALL
            .iter()
            .copied()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| format!("Unknown trigger phase: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polymorphic_matching() {
        assert!(TriggerPhase::Validator.is_a(TriggerPhase::Validator));
        assert!(TriggerPhase::Validator.is_a(TriggerPhase::BeforeSave));
        assert!(!TriggerPhase::BeforeSave.is_a(TriggerPhase::Validator));
        assert!(!TriggerPhase::AfterSave.is_a(TriggerPhase::BeforeSave));

        for phase in TriggerPhase::ALL {
            assert!(phase.is_a(phase));
        }
    }

    #[test]
    fn test_names_round_trip() {
        for phase in TriggerPhase::ALL {
            assert_eq!(phase.as_str().parse::<TriggerPhase>(), Ok(phase));
        }
        assert!("on_save".parse::<TriggerPhase>().is_err());
    }
}
