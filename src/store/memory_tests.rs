use super::*;
use crate::contacts::StatusFilter;
use crate::model::{AdvisorRole, ContactStatus};
use chrono::{Duration, Utc};

fn advisor(id: Uuid, firm_id: Uuid, email: &str) -> Advisor {
    let now = Utc::now();
    Advisor {
        id,
        firm_id,
        email: email.into(),
        first_name: "First".into(),
        last_name: "Last".into(),
        role: AdvisorRole::Advisor,
        created_at: now,
        updated_at: now,
    }
}

fn contact(firm_id: Uuid, first: &str, email: Option<&str>) -> Contact {
    let now = Utc::now();
    Contact {
        id: Uuid::new_v4(),
        firm_id,
        first_name: first.into(),
        last_name: "Doe".into(),
        email: email.map(|e| e.to_string()),
        phone: None,
        status: ContactStatus::Prospect,
        created_at: now,
        updated_at: now,
    }
}

struct Fixture {
    store: MemoryStore,
    f1: Uuid,
    f2: Uuid,
    a1: Uuid,
    a2: Uuid,
}

async fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let f1 = Uuid::new_v4();
    let f2 = Uuid::new_v4();
    store.insert_firm(Actor::Service, Firm::new(f1, "One", "one")).await.unwrap();
    store.insert_firm(Actor::Service, Firm::new(f2, "Two", "two")).await.unwrap();
    let a1 = Uuid::new_v4();
    let a2 = Uuid::new_v4();
    store.upsert_advisor(Actor::Service, advisor(a1, f1, "a1@one.test")).await.unwrap();
    store.upsert_advisor(Actor::Service, advisor(a2, f2, "a2@two.test")).await.unwrap();
    Fixture { store, f1, f2, a1, a2 }
}

#[tokio::test]
async fn scoped_reads_hide_other_firms() {
    let fx = fixture().await;
    let c2 = fx.store.insert_contact(Actor::Service, contact(fx.f2, "Other", None)).await.unwrap();

    assert!(fx.store.contact(Actor::User(fx.a1), c2.id).await.unwrap().is_none());
    assert!(fx.store.contact(Actor::User(fx.a2), c2.id).await.unwrap().is_some());
    // Even asking for the other firm explicitly yields nothing.
    let slice = fx.store.list_contacts(Actor::User(fx.a1), fx.f2, &ContactFilter::default(), Page::default()).await.unwrap();
    assert!(slice.contacts.is_empty());
    assert_eq!(slice.total, 0);
    assert!(fx.store.firm(Actor::User(fx.a1), fx.f2).await.unwrap().is_none());
    assert!(fx.store.advisor(Actor::User(fx.a1), fx.a2).await.unwrap().is_none());
}

#[tokio::test]
async fn unregistered_user_sees_nothing() {
    let fx = fixture().await;
    fx.store.insert_contact(Actor::Service, contact(fx.f1, "Mine", None)).await.unwrap();
    let stranger = Actor::User(Uuid::new_v4());
    assert!(fx.store.advisor_with_firm(stranger, fx.a1).await.unwrap().is_none());
    assert_eq!(fx.store.count_contacts(stranger, fx.f1).await.unwrap(), 0);
    assert!(fx.store.firms_with_contact_counts(stranger).await.unwrap().is_empty());
}

#[tokio::test]
async fn insert_into_foreign_firm_violates_policy() {
    let fx = fixture().await;
    let err = fx.store.insert_contact(Actor::User(fx.a1), contact(fx.f2, "Forged", None)).await.unwrap_err();
    match err {
        StoreError::PolicyViolation { policy, table, command } => {
            assert_eq!(policy, "contacts_insert_same_firm");
            assert_eq!(table, "contacts");
            assert_eq!(command, "insert");
        }
        other => panic!("expected policy violation, got {:?}", other),
    }
}

#[tokio::test]
async fn update_cannot_move_contact_to_another_firm() {
    let fx = fixture().await;
    let c = fx.store.insert_contact(Actor::User(fx.a1), contact(fx.f1, "Mine", None)).await.unwrap();
    let moved = Contact { firm_id: fx.f2, ..c.clone() };
    let err = fx.store.update_contact(Actor::User(fx.a1), moved).await.unwrap_err();
    assert!(matches!(err, StoreError::PolicyViolation { .. }));
    // Updating a hidden row touches nothing.
    let hidden = fx.store.update_contact(Actor::User(fx.a2), Contact { first_name: "X".into(), ..c.clone() }).await.unwrap();
    assert!(hidden.is_none());
    assert_eq!(fx.store.contact(Actor::Service, c.id).await.unwrap().unwrap().first_name, "Mine");
}

#[tokio::test]
async fn delete_respects_firm_and_policy() {
    let fx = fixture().await;
    let c = fx.store.insert_contact(Actor::Service, contact(fx.f1, "Mine", None)).await.unwrap();
    assert!(!fx.store.delete_contact(Actor::User(fx.a2), fx.f1, c.id).await.unwrap());
    assert!(!fx.store.delete_contact(Actor::User(fx.a1), fx.f2, c.id).await.unwrap());
    assert!(fx.store.delete_contact(Actor::User(fx.a1), fx.f1, c.id).await.unwrap());
    assert!(fx.store.contact(Actor::Service, c.id).await.unwrap().is_none());
}

#[tokio::test]
async fn advisors_update_only_themselves() {
    let fx = fixture().await;
    let colleague = Uuid::new_v4();
    fx.store.upsert_advisor(Actor::Service, advisor(colleague, fx.f1, "c@one.test")).await.unwrap();

    let visible = fx.store.list_advisors(Actor::User(fx.a1), fx.f1).await.unwrap();
    assert_eq!(visible.len(), 2);

    let mut other = fx.store.advisor(Actor::User(fx.a1), colleague).await.unwrap().unwrap();
    other.first_name = "Hijacked".into();
    assert!(fx.store.update_advisor(Actor::User(fx.a1), other).await.unwrap().is_none());

    let mut me = fx.store.advisor(Actor::User(fx.a1), fx.a1).await.unwrap().unwrap();
    me.first_name = "Renamed".into();
    let saved = fx.store.update_advisor(Actor::User(fx.a1), me).await.unwrap().unwrap();
    assert_eq!(saved.first_name, "Renamed");
}

#[tokio::test]
async fn users_cannot_create_firms_or_advisors() {
    let fx = fixture().await;
    let err = fx.store.insert_firm(Actor::User(fx.a1), Firm::new(Uuid::new_v4(), "Rogue", "rogue")).await.unwrap_err();
    assert!(matches!(err, StoreError::PolicyViolation { .. }));
    let err = fx.store.upsert_advisor(Actor::User(fx.a1), advisor(Uuid::new_v4(), fx.f1, "new@one.test")).await.unwrap_err();
    assert!(matches!(err, StoreError::PolicyViolation { .. }));
}

#[tokio::test]
async fn unique_and_reference_constraints() {
    let fx = fixture().await;
    fx.store.insert_contact(Actor::Service, contact(fx.f1, "A", Some("dup@x.test"))).await.unwrap();
    // Global uniqueness: another firm cannot reuse the address either.
    let err = fx.store.insert_contact(Actor::Service, contact(fx.f2, "B", Some("dup@x.test"))).await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { ref field } if field == "email"));
    // Missing emails never collide.
    fx.store.insert_contact(Actor::Service, contact(fx.f1, "C", None)).await.unwrap();
    fx.store.insert_contact(Actor::Service, contact(fx.f1, "D", None)).await.unwrap();

    let err = fx.store.insert_contact(Actor::Service, contact(Uuid::new_v4(), "E", None)).await.unwrap_err();
    assert!(matches!(err, StoreError::MissingReference { .. }));
    let err = fx.store.insert_firm(Actor::Service, Firm::new(Uuid::new_v4(), "Dup", "one")).await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { ref field } if field == "slug"));
    let err = fx.store.upsert_advisor(Actor::Service, advisor(Uuid::new_v4(), fx.f1, "a2@two.test")).await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { ref field } if field == "email"));
}

#[tokio::test]
async fn listing_is_newest_first_with_insertion_tiebreak() {
    let fx = fixture().await;
    let base = Utc::now();
    let mut old = contact(fx.f1, "Old", None);
    old.created_at = base - Duration::days(2);
    let mut tie_a = contact(fx.f1, "TieA", None);
    tie_a.created_at = base;
    let mut tie_b = contact(fx.f1, "TieB", None);
    tie_b.created_at = base;
    for c in [tie_a, old, tie_b] {
        fx.store.insert_contact(Actor::Service, c).await.unwrap();
    }
    let all = ContactFilter::default();
    let slice = fx.store.list_contacts(Actor::User(fx.a1), fx.f1, &all, Page::default()).await.unwrap();
    let names: Vec<&str> = slice.contacts.iter().map(|c| c.first_name.as_str()).collect();
    assert_eq!(names, vec!["TieB", "TieA", "Old"]);
    assert_eq!((slice.matched, slice.total), (3, 3));

    let slice = fx.store.list_contacts(Actor::User(fx.a1), fx.f1, &all, Page { limit: 1, offset: 1 }).await.unwrap();
    assert_eq!(slice.contacts.len(), 1);
    assert_eq!(slice.contacts[0].first_name, "TieA");
    assert_eq!(slice.total, 3);
}

#[tokio::test]
async fn filter_applies_before_the_page_window() {
    let fx = fixture().await;
    let base = Utc::now();
    let mut needle = contact(fx.f1, "Zelda", None);
    needle.last_name = "Needle".into();
    needle.created_at = base - Duration::minutes(10);
    fx.store.insert_contact(Actor::Service, needle).await.unwrap();
    for i in 0..3 {
        let mut c = contact(fx.f1, &format!("Newer{i}"), None);
        c.created_at = base + Duration::minutes(i);
        fx.store.insert_contact(Actor::Service, c).await.unwrap();
    }
    let page = Page { limit: 2, offset: 0 };
    let hit = ContactFilter::new("NEEDLE", StatusFilter::All);
    let slice = fx.store.list_contacts(Actor::User(fx.a1), fx.f1, &hit, page).await.unwrap();
    assert_eq!(slice.contacts.len(), 1);
    assert_eq!(slice.contacts[0].first_name, "Zelda");
    assert_eq!((slice.matched, slice.total), (1, 4));

    let newer = ContactFilter::new("newer", StatusFilter::All);
    let slice = fx.store.list_contacts(Actor::User(fx.a1), fx.f1, &newer, Page { limit: 2, offset: 2 }).await.unwrap();
    assert_eq!(slice.contacts.len(), 1);
    assert_eq!(slice.contacts[0].first_name, "Newer0");
    assert_eq!(slice.matched, 3);
}

#[tokio::test]
async fn offline_store_reports_unavailable() {
    let fx = fixture().await;
    fx.store.set_available(false);
    let all = ContactFilter::default();
    let err = fx.store.list_contacts(Actor::User(fx.a1), fx.f1, &all, Page::default()).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    fx.store.set_available(true);
    assert!(fx.store.list_contacts(Actor::User(fx.a1), fx.f1, &all, Page::default()).await.is_ok());
}

#[tokio::test]
async fn upsert_keeps_created_at() {
    let fx = fixture().await;
    let first = fx.store.advisor(Actor::Service, fx.a1).await.unwrap().unwrap();
    let mut changed = advisor(fx.a1, fx.f1, "a1@one.test");
    changed.last_name = "Changed".into();
    changed.created_at = first.created_at + Duration::days(10);
    let saved = fx.store.upsert_advisor(Actor::Service, changed).await.unwrap();
    assert_eq!(saved.created_at, first.created_at);
    assert_eq!(saved.last_name, "Changed");
}
