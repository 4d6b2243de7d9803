//! CRM domain module (customers and their addresses, event-sourced).
//!
//! Business rules for the customer registry: identity data, family
//! relations, signature specimens, and postal addresses with a verification
//! lifecycle. Pure deterministic domain logic: no IO, no HTTP, no storage.

pub mod address;
pub mod customer;

pub use address::{
    AddAddress, Address, AddressAdded, AddressCommand, AddressEvent, AddressId, AddressRejected,
    AddressRemoved, AddressUpdated, AddressVerified, PostalAddress, RejectAddress, RemoveAddress,
    UpdateAddress, VerificationStatus, VerifyAddress,
};
pub use customer::{
    AddFamilyRelation, ArchiveCustomer, AttachSignature, ContactInfo, Customer, CustomerArchived,
    CustomerCommand, CustomerEvent, CustomerId, CustomerRegistered, CustomerStatus,
    CustomerUpdated, FamilyRelation, FamilyRelationAdded, FamilyRelationRemoved, MediaRef,
    RegisterCustomer, RelationKind, RemoveFamilyRelation, RevokeSignature, Signature,
    SignatureAttached, SignatureRevoked, UpdateCustomer,
};
