//! Warning classes, stack push/pop, enable/suppress (§4.9).
//!
//! One byte per class in a flat array, holding an "enabled" bit and an "error-promoted" bit,
//! exactly as §3 describes. A stack of snapshots supports `WARNING PUSH`/`WARNING POP`; the
//! snapshot captured immediately after command-line parsing is permanent and never popped.

use crate::error::ConfigError;

macro_rules! warning_classes {
    ($($variant:ident => $name:literal, $default:expr);* $(;)?) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub enum WarningClass {
            $($variant),*
        }

        impl WarningClass {
            pub const ALL: &'static [WarningClass] = &[$(WarningClass::$variant),*];

            pub fn name(self) -> &'static str {
                match self { $(WarningClass::$variant => $name),* }
            }

            pub fn default_state(self) -> WarnState {
                match self { $(WarningClass::$variant => $default),* }
            }

            pub fn from_name(name: &str) -> Option<WarningClass> {
                let lower = name.to_ascii_lowercase();
                match lower.as_str() {
                    $($name => Some(WarningClass::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

warning_classes! {
    Other                 => "other", WarnState::On;
    MacroParams           => "macro-params", WarnState::On;
    MacroSelfref          => "macro-selfref", WarnState::Off;
    MacroDefaults         => "macro-defaults", WarnState::On;
    OrphanLabels          => "orphan-labels", WarnState::On;
    NumberOverflow        => "number-overflow", WarnState::On;
    GnuElfExtensions      => "gnu-elf-extensions", WarnState::Off;
    FloatDenorm           => "float-denorm", WarnState::Off;
    FloatOverflow         => "float-overflow", WarnState::On;
    FloatUnderflow        => "float-underflow", WarnState::Off;
    FloatToint            => "float-toint", WarnState::On;
    UnknownWarning        => "unknown-warning", WarnState::On;
    LockLea               => "lock-lea", WarnState::On;
    HleLock               => "hle-lock", WarnState::On;
    BndLock               => "bnd-lock", WarnState::On;
    ForwardLabel          => "forward-label", WarnState::Off;
    WarnStackEmpty        => "warn-stack-empty", WarnState::On;
    PtrMismatch           => "ptr-mismatch", WarnState::On;
    BadPragma              => "bad-pragma", WarnState::On;
    NotMyContext           => "not-my-context", WarnState::Off;
    LabelRedef            => "label-redefined", WarnState::On;
    LabelRedefLate         => "label-redefined-late", WarnState::On;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WarnState {
    Off,
    On,
    Error,
}

/// A full snapshot of every class's state; stack elements and the "current" state share this
/// representation so push/pop is a plain `Vec::push`/`Vec::pop`.
#[derive(Clone, PartialEq, Debug)]
pub struct Snapshot {
    states: Vec<WarnState>,
}

impl Snapshot {
    fn index(class: WarningClass) -> usize {
        WarningClass::ALL.iter().position(|c| *c == class).unwrap()
    }

    pub fn all_defaults() -> Self {
        Snapshot { states: WarningClass::ALL.iter().map(|c| c.default_state()).collect() }
    }

    pub fn all_on() -> Self {
        Snapshot { states: vec![WarnState::On; WarningClass::ALL.len()] }
    }

    pub fn get(&self, class: WarningClass) -> WarnState {
        self.states[Self::index(class)]
    }

    pub fn set(&mut self, class: WarningClass, state: WarnState) {
        self.states[Self::index(class)] = state;
    }
}

/// One parsed `[WARNING ...]`/`-w...` action verb (§6).
#[derive(Clone, Debug)]
pub enum WarnAction {
    Enable(String),
    Disable(String),
    ResetToDefault(String),
    PromoteToError(String),
    All(bool),
    Push,
    Pop,
}

pub fn parse_directive_arg(arg: &str) -> Result<WarnAction, ConfigError> {
    if let Some(rest) = arg.strip_prefix("error=") {
        return Ok(WarnAction::PromoteToError(rest.to_string()));
    }
    if arg.eq_ignore_ascii_case("push") {
        return Ok(WarnAction::Push);
    }
    if arg.eq_ignore_ascii_case("pop") {
        return Ok(WarnAction::Pop);
    }
    if arg.eq_ignore_ascii_case("none") {
        return Ok(WarnAction::All(false));
    }
    if arg.eq_ignore_ascii_case("all") {
        return Ok(WarnAction::All(true));
    }
    if let Some(rest) = arg.strip_prefix('+') {
        return Ok(WarnAction::Enable(rest.to_string()));
    }
    if let Some(rest) = arg.strip_prefix('-') {
        return Ok(WarnAction::Disable(rest.to_string()));
    }
    if let Some(rest) = arg.strip_prefix('*') {
        return Ok(WarnAction::ResetToDefault(rest.to_string()));
    }
    Err(ConfigError::InvalidSize)
}

/// Process-wide warning state: a stack of snapshots, the bottom one permanent (§4.9, §9 open
/// question on listing threading is unrelated and not modeled here).
pub struct WarningState {
    stack: Vec<Snapshot>,
    /// Index 0 of `stack`: captured once, right after command-line parsing, and never popped.
    floor_len: usize,
}

impl WarningState {
    pub fn new() -> Self {
        WarningState { stack: vec![Snapshot::all_defaults()], floor_len: 1 }
    }

    /// Call once after command-line processing to seal the bottom-of-stack snapshot.
    pub fn seal_floor(&mut self) {
        self.floor_len = self.stack.len();
    }

    pub fn current(&self) -> &Snapshot {
        self.stack.last().unwrap()
    }

    fn current_mut(&mut self) -> &mut Snapshot {
        self.stack.last_mut().unwrap()
    }

    pub fn push(&mut self) {
        let top = self.current().clone();
        self.stack.push(top);
    }

    /// Pops the top snapshot. Popping below the permanent floor triggers `warn-stack-empty` and
    /// resets state to "all on" (§4.9), reported via the returned bool.
    pub fn pop(&mut self) -> bool {
        if self.stack.len() > self.floor_len {
            self.stack.pop();
            true
        } else {
            *self.current_mut() = Snapshot::all_on();
            false
        }
    }

    /// Restores the bottom-of-stack snapshot without popping it (§8 property 6).
    pub fn reset_to_floor(&mut self) {
        let floor = self.stack[self.floor_len - 1].clone();
        *self.current_mut() = floor;
    }

    fn apply_named<F: Fn(&mut Snapshot, WarningClass)>(&mut self, name: &str, f: F) -> Result<(), ConfigError> {
        let matched: Vec<WarningClass> = if let Some(prefix) = name.strip_suffix('-') {
            WarningClass::ALL
                .iter()
                .copied()
                .filter(|c| c.name().starts_with(prefix) && c.name().contains('-'))
                .collect()
        } else {
            WarningClass::from_name(name).into_iter().collect()
        };
        if matched.is_empty() {
            self.apply(WarnAction::Enable(WarningClass::UnknownWarning.name().to_string()))?;
            return Err(ConfigError::UnknownWarningName(name.to_string()));
        }
        let snap = self.current_mut();
        for c in matched {
            f(snap, c);
        }
        Ok(())
    }

    pub fn apply(&mut self, action: WarnAction) -> Result<(), ConfigError> {
        match action {
            WarnAction::Enable(name) => self.apply_named(&name, |s, c| s.set(c, WarnState::On)),
            WarnAction::Disable(name) => self.apply_named(&name, |s, c| s.set(c, WarnState::Off)),
            WarnAction::ResetToDefault(name) => {
                self.apply_named(&name, |s, c| s.set(c, c.default_state()))
            }
            WarnAction::PromoteToError(name) => self.apply_named(&name, |s, c| s.set(c, WarnState::Error)),
            WarnAction::All(on) => {
                let state = if on { WarnState::On } else { WarnState::Off };
                let snap = self.current_mut();
                for c in WarningClass::ALL.iter().copied() {
                    snap.set(c, state);
                }
                Ok(())
            }
            WarnAction::Push => {
                self.push();
                Ok(())
            }
            WarnAction::Pop => {
                if !self.pop() {
                    self.apply_named("warn-stack-empty", |s, c| s.set(c, WarnState::On)).ok();
                }
                Ok(())
            }
        }
    }

    pub fn is_error(&self, class: WarningClass) -> bool {
        self.current().get(class) == WarnState::Error
    }

    pub fn is_enabled(&self, class: WarningClass) -> bool {
        !matches!(self.current().get(class), WarnState::Off)
    }
}

impl Default for WarningState {
    fn default() -> Self {
        WarningState::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_pop_restores_previous_state() {
        let mut w = WarningState::new();
        w.seal_floor();
        w.push();
        w.apply(WarnAction::Disable("float-overflow".to_string())).unwrap();
        assert!(!w.is_enabled(WarningClass::FloatOverflow));
        w.pop();
        assert!(w.is_enabled(WarningClass::FloatOverflow));
    }

    #[test]
    fn reset_to_floor_does_not_pop() {
        let mut w = WarningState::new();
        w.seal_floor();
        let depth_before = w.stack.len();
        w.push();
        w.apply(WarnAction::All(false)).unwrap();
        w.reset_to_floor();
        assert_eq!(w.stack.len(), depth_before + 1);
        assert!(w.is_enabled(WarningClass::Other));
    }

    #[test]
    fn prefix_match_enables_every_float_class() {
        let mut w = WarningState::new();
        w.apply(WarnAction::Disable("float-".to_string())).unwrap();
        assert!(!w.is_enabled(WarningClass::FloatOverflow));
        assert!(!w.is_enabled(WarningClass::FloatDenorm));
        assert!(w.is_enabled(WarningClass::Other));
    }

    #[test]
    fn unknown_name_triggers_unknown_warning_class() {
        let mut w = WarningState::new();
        let err = w.apply(WarnAction::Disable("not-a-real-class".to_string()));
        assert!(err.is_err());
    }

    #[test]
    fn error_promotion_is_queryable() {
        let mut w = WarningState::new();
        w.apply(WarnAction::PromoteToError("float-overflow".to_string())).unwrap();
        assert!(w.is_error(WarningClass::FloatOverflow));
    }
}
