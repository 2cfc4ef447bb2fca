//! Validated names for leased resources and the runs that hold them.
//!
//! Both identifiers are stored verbatim in the backing tables and compared byte for byte, so
//! values that would look identical in logs (padded, or carrying control characters) are
//! rejected up front.

// std
use std::ops::Deref;
// self
use crate::_prelude::*;

const MAX_CHARS: usize = 128;

macro_rules! def_id {
	($name:ident, $kind:literal, $doc:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Validates and wraps `value`.
			pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
				let value = value.into();

				check($kind, &value)?;

				Ok(Self(value))
			}

			/// Borrows the raw value.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &str {
				&self.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				Self::new(value)
			}
		}
		impl From<$name> for String {
			fn from(id: $name) -> Self {
				id.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, "{}({:?})", $kind, self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
	};
}

def_id! { LockKey, "LockKey", "Name of a resource guarded by a lease, such as `reminders-daily`." }
def_id! { HolderId, "Holder", "Opaque identity of the run acquiring a lease." }

/// Rejection reasons for [`LockKey`] and [`HolderId`] values.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IdentifierError {
	/// Nothing was supplied.
	#[error("{kind} cannot be empty.")]
	Empty {
		/// Identifier kind.
		kind: &'static str,
	},
	/// Leading or trailing whitespace.
	#[error("{kind} must not start or end with whitespace.")]
	Padded {
		/// Identifier kind.
		kind: &'static str,
	},
	/// Tabs, newlines, or other control characters.
	#[error("{kind} must not contain control characters.")]
	ControlCharacter {
		/// Identifier kind.
		kind: &'static str,
	},
	/// More than the permitted number of characters.
	#[error("{kind} is longer than {max} characters.")]
	TooLong {
		/// Identifier kind.
		kind: &'static str,
		/// Character limit.
		max: usize,
	},
}

fn check(kind: &'static str, value: &str) -> Result<(), IdentifierError> {
	if value.is_empty() {
		Err(IdentifierError::Empty { kind })
	} else if value.trim() != value {
		Err(IdentifierError::Padded { kind })
	} else if value.chars().any(char::is_control) {
		Err(IdentifierError::ControlCharacter { kind })
	} else if value.chars().count() > MAX_CHARS {
		Err(IdentifierError::TooLong { kind, max: MAX_CHARS })
	} else {
		Ok(())
	}
}
