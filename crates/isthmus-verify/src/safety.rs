//! Boundary Safety Verifier.
//!
//! Decides, per crossing value, whether memory safety follows from static
//! structure alone. `Transfer` is proved by the handle table's single-owner
//! invariant and by-copy borrows never reach caller memory. `Borrow` and
//! `View` depend on what the caller does during the call and get a runtime
//! guard. `Share` is proved when the receiving side can adjust the count
//! atomically and rejected otherwise.

use tracing::debug;

use isthmus_catalog::TypeCatalog;
use isthmus_core::{Finding, Guard, OwnershipMode, Side};
use isthmus_ownership::Slot;

use crate::profile::VerificationProfile;
use crate::signature::{CheckedSignature, CheckedSlot};

enum SlotVerdict {
    Proved,
    Guard(Guard),
    Rejected(String),
}

/// Verify a checked signature and produce the item's finding.
pub fn verify(
    catalog: &TypeCatalog,
    sig: &CheckedSignature,
    profile: &VerificationProfile,
) -> Finding {
    let mut guards = Vec::new();
    let mut rejections = Vec::new();

    for slot in &sig.slots {
        match verify_slot(catalog, sig, slot, profile) {
            SlotVerdict::Proved => {}
            SlotVerdict::Guard(guard) => guards.push(guard),
            SlotVerdict::Rejected(reason) => rejections.push(reason),
        }
    }

    let finding = if !rejections.is_empty() {
        Finding::Rejected(rejections.join("; "))
    } else if !guards.is_empty() {
        Finding::GuardInserted(guards)
    } else {
        Finding::Proved
    };
    debug!(item = %sig.item, finding = %finding, "verified");
    finding
}

fn verify_slot(
    catalog: &TypeCatalog,
    sig: &CheckedSignature,
    slot: &CheckedSlot,
    profile: &VerificationProfile,
) -> SlotVerdict {
    let own = &slot.slot.ownership;
    let name = slot.name();
    match own.mode {
        OwnershipMode::Transfer => SlotVerdict::Proved,
        OwnershipMode::Borrow if own.by_copy => SlotVerdict::Proved,
        OwnershipMode::Borrow | OwnershipMode::View if sig.asynchronous => {
            SlotVerdict::Rejected(format!(
                "'{name}': {} window cannot be bounded by an asynchronous call",
                own.mode
            ))
        }
        OwnershipMode::Borrow => SlotVerdict::Guard(Guard::LivenessToken {
            value: name.to_string(),
            mutable: own.mutable,
        }),
        OwnershipMode::View => match own.bound {
            Some(bound) => SlotVerdict::Guard(Guard::BoundsCheck {
                value: name.to_string(),
                bound,
            }),
            None => SlotVerdict::Rejected(format!("'{name}': view has no bound")),
        },
        OwnershipMode::Share => verify_share(catalog, sig, slot, profile),
    }
}

fn verify_share(
    catalog: &TypeCatalog,
    sig: &CheckedSignature,
    slot: &CheckedSlot,
    profile: &VerificationProfile,
) -> SlotVerdict {
    let name = slot.name();
    if !profile.multi_threaded_host {
        return SlotVerdict::Proved;
    }
    let shareable = catalog
        .get(sig.item.side, &slot.slot.ty)
        .is_some_and(|t| t.capabilities.is_thread_shareable());
    if !shareable {
        return SlotVerdict::Rejected(format!(
            "'{name}': '{}' is reference counted but not thread-shareable",
            slot.slot.ty
        ));
    }
    let receiver: Side = match slot.slot.slot {
        Slot::Param(_) => sig.direction.callee(),
        Slot::Return => sig.direction.caller(),
    };
    if !profile.atomics(receiver) {
        return SlotVerdict::Rejected(format!(
            "'{name}': side {receiver} cannot adjust the reference count atomically"
        ));
    }
    SlotVerdict::Proved
}
