/// Payload handed to an event handler.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EventArgs {
    #[default]
    Empty,
    Mouse(MouseEventArgs),
    Keyboard(KeyboardEventArgs),
    Change(ChangeEventArgs),
    Focus,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MouseEventArgs {
    pub detail: i64,
    pub button: i64,
    pub client_x: f64,
    pub client_y: f64,
    pub alt_key: bool,
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub meta_key: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyboardEventArgs {
    pub key: String,
    pub code: String,
    pub repeat: bool,
    pub alt_key: bool,
    pub ctrl_key: bool,
    pub shift_key: bool,
    pub meta_key: bool,
}

impl KeyboardEventArgs {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeEventArgs {
    pub value: String,
}

impl EventArgs {
    pub fn click() -> Self {
        Self::Mouse(MouseEventArgs {
            detail: 1,
            ..MouseEventArgs::default()
        })
    }

    pub fn change(value: impl Into<String>) -> Self {
        Self::Change(ChangeEventArgs {
            value: value.into(),
        })
    }

    /// Value carried by a change/input payload.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Change(args) => Some(&args.value),
            _ => None,
        }
    }

    pub fn as_mouse(&self) -> Option<&MouseEventArgs> {
        match self {
            Self::Mouse(args) => Some(args),
            _ => None,
        }
    }

    pub fn as_keyboard(&self) -> Option<&KeyboardEventArgs> {
        match self {
            Self::Keyboard(args) => Some(args),
            _ => None,
        }
    }
}
