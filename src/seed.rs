//! Demo dataset: three firms with fixed ids and their contacts.

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::model::{Contact, ContactStatus, Firm};
use crate::model::ContactStatus::{Active, Former, Inactive, Prospect};
use crate::store::{Actor, Store};

pub const WEALTH_MANAGEMENT_PARTNERS: Uuid = Uuid::from_u128(0x550e8400_e29b_41d4_a716_446655440001);
pub const INVESTMENT_SOLUTIONS: Uuid = Uuid::from_u128(0x550e8400_e29b_41d4_a716_446655440002);
pub const FINANCIAL_PLANNING_GROUP: Uuid = Uuid::from_u128(0x550e8400_e29b_41d4_a716_446655440003);

const FIRMS: &[(Uuid, &str, &str)] = &[
    (WEALTH_MANAGEMENT_PARTNERS, "Wealth Management Partners", "wealth-management-partners"),
    (INVESTMENT_SOLUTIONS, "Investment Solutions LLC", "investment-solutions-llc"),
    (FINANCIAL_PLANNING_GROUP, "Financial Planning Group", "financial-planning-group"),
];

// (firm, first, last, email, phone, status)
const CONTACTS: &[(Uuid, &str, &str, &str, &str, ContactStatus)] = &[
    (WEALTH_MANAGEMENT_PARTNERS, "John", "Smith", "john.smith@email.com", "555-0101", Active),
    (WEALTH_MANAGEMENT_PARTNERS, "Sarah", "Johnson", "sarah.johnson@email.com", "555-0102", Active),
    (WEALTH_MANAGEMENT_PARTNERS, "Michael", "Brown", "michael.brown@email.com", "555-0103", Prospect),
    (WEALTH_MANAGEMENT_PARTNERS, "Emily", "Davis", "emily.davis@email.com", "555-0104", Active),
    (WEALTH_MANAGEMENT_PARTNERS, "David", "Wilson", "david.wilson@email.com", "555-0105", Inactive),
    (WEALTH_MANAGEMENT_PARTNERS, "Lisa", "Miller", "lisa.miller@email.com", "555-0106", Active),
    (WEALTH_MANAGEMENT_PARTNERS, "Robert", "Moore", "robert.moore@email.com", "555-0107", Prospect),
    (WEALTH_MANAGEMENT_PARTNERS, "Jennifer", "Taylor", "jennifer.taylor@email.com", "555-0108", Active),
    (WEALTH_MANAGEMENT_PARTNERS, "James", "Anderson", "james.anderson@email.com", "555-0109", Former),
    (WEALTH_MANAGEMENT_PARTNERS, "Mary", "Thomas", "mary.thomas@email.com", "555-0110", Active),
    (WEALTH_MANAGEMENT_PARTNERS, "Christopher", "Jackson", "chris.jackson@email.com", "555-0111", Prospect),
    (WEALTH_MANAGEMENT_PARTNERS, "Patricia", "White", "patricia.white@email.com", "555-0112", Active),
    (WEALTH_MANAGEMENT_PARTNERS, "Daniel", "Harris", "daniel.harris@email.com", "555-0113", Inactive),
    (WEALTH_MANAGEMENT_PARTNERS, "Jessica", "Martin", "jessica.martin@email.com", "555-0114", Active),
    (WEALTH_MANAGEMENT_PARTNERS, "Matthew", "Garcia", "matthew.garcia@email.com", "555-0115", Prospect),
    (INVESTMENT_SOLUTIONS, "Amanda", "Rodriguez", "amanda.rodriguez@email.com", "555-0201", Active),
    (INVESTMENT_SOLUTIONS, "Ryan", "Lewis", "ryan.lewis@email.com", "555-0202", Prospect),
    (INVESTMENT_SOLUTIONS, "Nicole", "Walker", "nicole.walker@email.com", "555-0203", Active),
    (INVESTMENT_SOLUTIONS, "Kevin", "Hall", "kevin.hall@email.com", "555-0204", Inactive),
    (INVESTMENT_SOLUTIONS, "Ashley", "Allen", "ashley.allen@email.com", "555-0205", Active),
    (INVESTMENT_SOLUTIONS, "Brian", "Young", "brian.young@email.com", "555-0206", Former),
    (INVESTMENT_SOLUTIONS, "Stephanie", "King", "stephanie.king@email.com", "555-0207", Prospect),
    (INVESTMENT_SOLUTIONS, "Joseph", "Wright", "joseph.wright@email.com", "555-0208", Active),
    (FINANCIAL_PLANNING_GROUP, "Michelle", "Lopez", "michelle.lopez@email.com", "555-0301", Active),
    (FINANCIAL_PLANNING_GROUP, "Andrew", "Hill", "andrew.hill@email.com", "555-0302", Prospect),
    (FINANCIAL_PLANNING_GROUP, "Lauren", "Scott", "lauren.scott@email.com", "555-0303", Inactive),
    (FINANCIAL_PLANNING_GROUP, "Thomas", "Green", "thomas.green@email.com", "555-0304", Active),
    (FINANCIAL_PLANNING_GROUP, "Rachel", "Adams", "rachel.adams@email.com", "555-0305", Former),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub firms: usize,
    pub contacts: usize,
}

/// Load the demo dataset into an empty store. Returns `None` (and writes nothing) when the
/// store already holds a firm.
pub async fn seed_demo_data(store: &dyn Store) -> Result<Option<SeedSummary>> {
    if !store.is_empty().await.context("checking whether the store is empty")? {
        info!(target: "startup", "store already populated; demo seed skipped");
        return Ok(None);
    }
    for (id, name, slug) in FIRMS {
        store
            .insert_firm(Actor::Service, Firm::new(*id, *name, *slug))
            .await
            .with_context(|| format!("seeding firm {}", slug))?;
    }
    for (firm_id, first, last, email, phone, status) in CONTACTS {
        let now = Utc::now();
        let contact = Contact {
            id: Uuid::new_v4(),
            firm_id: *firm_id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: Some(email.to_string()),
            phone: Some(phone.to_string()),
            status: *status,
            created_at: now,
            updated_at: now,
        };
        store
            .insert_contact(Actor::Service, contact)
            .await
            .with_context(|| format!("seeding contact {}", email))?;
    }
    let summary = SeedSummary { firms: FIRMS.len(), contacts: CONTACTS.len() };
    info!(target: "startup", "demo data seeded: {} firms, {} contacts", summary.firms, summary.contacts);
    Ok(Some(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn seeds_once_with_expected_counts() {
        let store = MemoryStore::new();
        let summary = seed_demo_data(&store).await.unwrap().unwrap();
        assert_eq!(summary, SeedSummary { firms: 3, contacts: 28 });

        let counts: Vec<(String, u64)> = store
            .firms_with_contact_counts(Actor::Service)
            .await
            .unwrap()
            .into_iter()
            .map(|(f, n)| (f.slug, n))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("wealth-management-partners".to_string(), 15),
                ("investment-solutions-llc".to_string(), 8),
                ("financial-planning-group".to_string(), 5),
            ]
        );

        assert!(seed_demo_data(&store).await.unwrap().is_none());
    }
}
