//! Modal owners and the modality contexts built from them.
//!
//! A [`ModalityContext`] is a snapshot of the modal stack: the ordered list of
//! owners that were modal when it was captured. Contexts are compared by the
//! owners they contain, so leaving and re-entering the same owner yields an
//! equal context.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_PROJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a window-like object that can enter modal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
	/// Allocates a process-unique owner ID.
	pub fn next() -> Self {
		Self(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed))
	}

	/// Returns the raw ID value.
	#[inline]
	pub const fn get(self) -> u64 {
		self.0
	}
}

/// Identity of a project that scopes per-project modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(u64);

impl ProjectId {
	/// Allocates a process-unique project ID.
	pub fn next() -> Self {
		Self(NEXT_PROJECT_ID.fetch_add(1, Ordering::Relaxed))
	}

	/// Returns the raw ID value.
	#[inline]
	pub const fn get(self) -> u64 {
		self.0
	}
}

/// Whoever entered modal state: a dialog, optionally scoped to a project.
///
/// The dispatcher never looks inside an owner beyond identity. Two owners are
/// the same modal entity only if both the owner ID and the project match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModalOwner {
	id: OwnerId,
	project: Option<ProjectId>,
}

impl ModalOwner {
	/// Creates a fresh application-modal owner.
	pub fn application() -> Self {
		Self {
			id: OwnerId::next(),
			project: None,
		}
	}

	/// Creates a fresh owner that is modal within `project`.
	pub fn project(project: ProjectId) -> Self {
		Self {
			id: OwnerId::next(),
			project: Some(project),
		}
	}

	/// Builds an owner from existing identities.
	pub const fn from_parts(id: OwnerId, project: Option<ProjectId>) -> Self {
		Self { id, project }
	}

	pub const fn id(self) -> OwnerId {
		self.id
	}

	pub const fn project_id(self) -> Option<ProjectId> {
		self.project
	}
}

impl fmt::Display for ModalOwner {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.project {
			Some(project) => write!(f, "owner#{}@project#{}", self.id.0, project.0),
			None => write!(f, "owner#{}", self.id.0),
		}
	}
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum Repr {
	Any,
	Owners(Arc<[ModalOwner]>),
}

/// Modality state an action is tagged with.
///
/// # Invariants
///
/// - [`ModalityContext::non_modal`] holds no owners and is the root of every
///   context produced by the modal stack.
/// - [`ModalityContext::any`] is never dominated and dominates nothing.
/// - A context pushed by entering modal state contains its parent's owners in
///   the same order, followed by the new owner.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ModalityContext {
	repr: Repr,
}

impl ModalityContext {
	/// The root context: no modal owner is active.
	pub fn non_modal() -> Self {
		Self {
			repr: Repr::Owners(Arc::from(Vec::new())),
		}
	}

	/// A context whose actions run regardless of modality.
	pub fn any() -> Self {
		Self { repr: Repr::Any }
	}

	pub(crate) fn from_owners(owners: &[ModalOwner]) -> Self {
		Self {
			repr: Repr::Owners(Arc::from(owners)),
		}
	}

	pub fn is_any(&self) -> bool {
		matches!(self.repr, Repr::Any)
	}

	pub fn is_non_modal(&self) -> bool {
		matches!(&self.repr, Repr::Owners(owners) if owners.is_empty())
	}

	/// Owners in entry order. Empty for both `NON_MODAL` and `ANY`.
	pub fn owners(&self) -> &[ModalOwner] {
		match &self.repr {
			Repr::Any => &[],
			Repr::Owners(owners) => owners,
		}
	}

	/// Nesting depth (number of modal owners).
	pub fn depth(&self) -> usize {
		self.owners().len()
	}

	pub fn contains(&self, owner: ModalOwner) -> bool {
		self.owners().contains(&owner)
	}

	/// Returns true when `self` holds a modal owner that `other` does not.
	///
	/// A dominated context is blocked: its actions must wait until the
	/// dominating owners leave modal state.
	pub fn dominates(&self, other: &Self) -> bool {
		match (&self.repr, &other.repr) {
			(Repr::Any, _) | (_, Repr::Any) => false,
			(Repr::Owners(mine), Repr::Owners(theirs)) => mine.iter().any(|owner| !theirs.contains(owner)),
		}
	}

	/// Returns true when an action tagged with `tag` may run while `self` is
	/// the current context.
	#[inline]
	pub fn admits(&self, tag: &Self) -> bool {
		!self.dominates(tag)
	}
}

impl Default for ModalityContext {
	fn default() -> Self {
		Self::non_modal()
	}
}

impl fmt::Debug for ModalityContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.repr {
			Repr::Any => f.write_str("ModalityContext::ANY"),
			Repr::Owners(owners) if owners.is_empty() => f.write_str("ModalityContext::NON_MODAL"),
			Repr::Owners(owners) => f.debug_tuple("ModalityContext").field(&owners).finish(),
		}
	}
}
