//! Declarative row-security policies.
//!
//! `ROW_POLICIES` is the single source for store-level tenant isolation: [`MemoryStore`]
//! evaluates it directly and [`policy_ddl`] renders it into PostgreSQL `CREATE POLICY`
//! statements. Policies are permissive: a row is admitted for a command if any policy for
//! that table and command admits it, and denied when none exists.
//!
//! [`MemoryStore`]: super::MemoryStore

use uuid::Uuid;

/// Database role scoped operations switch to; row policies are granted to it.
pub const APP_ROLE: &str = "advisorhub_app";
/// Transaction-local setting carrying the acting user id.
pub const CURRENT_USER_SETTING: &str = "app.current_user_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Firms,
    Advisors,
    Contacts,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Firms, Table::Advisors, Table::Contacts];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Firms => "firms",
            Table::Advisors => "advisors",
            Table::Contacts => "contacts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
}

impl Command {
    pub const ALL: [Command; 4] = [Command::Select, Command::Insert, Command::Update, Command::Delete];

    pub fn name(&self) -> &'static str {
        match self {
            Command::Select => "select",
            Command::Insert => "insert",
            Command::Update => "update",
            Command::Delete => "delete",
        }
    }

    fn sql_keyword(&self) -> &'static str {
        match self {
            Command::Select => "SELECT",
            Command::Insert => "INSERT",
            Command::Update => "UPDATE",
            Command::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// The row is the acting user's own advisor row.
    SelfRow,
    /// The row belongs to the acting user's firm (for `firms`, the row is that firm).
    SameFirm,
}

#[derive(Debug, Clone, Copy)]
pub struct RowPolicy {
    pub name: &'static str,
    pub table: Table,
    pub command: Command,
    pub rule: Rule,
}

pub const ROW_POLICIES: &[RowPolicy] = &[
    RowPolicy { name: "firms_view_own", table: Table::Firms, command: Command::Select, rule: Rule::SameFirm },
    RowPolicy { name: "advisors_view_own", table: Table::Advisors, command: Command::Select, rule: Rule::SelfRow },
    RowPolicy { name: "advisors_view_same_firm", table: Table::Advisors, command: Command::Select, rule: Rule::SameFirm },
    RowPolicy { name: "advisors_update_own", table: Table::Advisors, command: Command::Update, rule: Rule::SelfRow },
    RowPolicy { name: "contacts_view_same_firm", table: Table::Contacts, command: Command::Select, rule: Rule::SameFirm },
    RowPolicy { name: "contacts_insert_same_firm", table: Table::Contacts, command: Command::Insert, rule: Rule::SameFirm },
    RowPolicy { name: "contacts_update_same_firm", table: Table::Contacts, command: Command::Update, rule: Rule::SameFirm },
    RowPolicy { name: "contacts_delete_same_firm", table: Table::Contacts, command: Command::Delete, rule: Rule::SameFirm },
];

/// Who is asking: the acting user and the firm their advisor row points at, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyContext {
    pub user_id: Uuid,
    pub firm_id: Option<Uuid>,
}

/// The two columns policies look at. For `firms` rows both are the firm id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRef {
    pub id: Uuid,
    pub firm_id: Uuid,
}

impl Rule {
    pub fn admits(&self, ctx: &PolicyContext, row: RowRef) -> bool {
        match self {
            Rule::SelfRow => row.id == ctx.user_id,
            Rule::SameFirm => ctx.firm_id == Some(row.firm_id),
        }
    }

    pub fn sql(&self, table: Table) -> &'static str {
        match (self, table) {
            (Rule::SelfRow, _) => "id = app_current_user()",
            (Rule::SameFirm, Table::Firms) => "id = app_current_firm()",
            (Rule::SameFirm, _) => "firm_id = app_current_firm()",
        }
    }
}

pub fn policies_for(table: Table, command: Command) -> impl Iterator<Item = &'static RowPolicy> {
    ROW_POLICIES.iter().filter(move |p| p.table == table && p.command == command)
}

pub fn permits(table: Table, command: Command, ctx: &PolicyContext, row: RowRef) -> bool {
    policies_for(table, command).any(|p| p.rule.admits(ctx, row))
}

/// Name reported when a write is rejected: the first policy for the command, or a marker
/// when the command has no policy at all (and is therefore always denied).
pub fn violated_policy_name(table: Table, command: Command) -> String {
    policies_for(table, command)
        .next()
        .map(|p| p.name.to_string())
        .unwrap_or_else(|| format!("{}_{}_denied", table.name(), command.name()))
}

impl RowPolicy {
    pub fn create_sql(&self) -> String {
        let expr = self.rule.sql(self.table);
        let clause = match self.command {
            Command::Select | Command::Delete => format!("USING ({})", expr),
            Command::Insert => format!("WITH CHECK ({})", expr),
            Command::Update => format!("USING ({expr}) WITH CHECK ({expr})", expr = expr),
        };
        format!(
            "CREATE POLICY {} ON {} FOR {} TO {} {}",
            self.name,
            self.table.name(),
            self.command.sql_keyword(),
            APP_ROLE,
            clause
        )
    }
}

/// Render the row-security DDL: enable RLS on every table, then (re)create each policy.
pub fn policy_ddl() -> String {
    let mut out = String::new();
    for t in Table::ALL {
        out.push_str(&format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY;\n", t.name()));
    }
    for p in ROW_POLICIES {
        out.push_str(&format!("DROP POLICY IF EXISTS {} ON {};\n", p.name, p.table.name()));
        out.push_str(&p.create_sql());
        out.push_str(";\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(user: Uuid, firm: Option<Uuid>) -> PolicyContext { PolicyContext { user_id: user, firm_id: firm } }

    #[test]
    fn advisors_can_read_own_row_even_without_firm_match() {
        let me = Uuid::new_v4();
        let row = RowRef { id: me, firm_id: Uuid::new_v4() };
        assert!(permits(Table::Advisors, Command::Select, &ctx(me, None), row));
        assert!(permits(Table::Advisors, Command::Update, &ctx(me, None), row));
    }

    #[test]
    fn advisors_update_is_self_only() {
        let firm = Uuid::new_v4();
        let me = Uuid::new_v4();
        let colleague = RowRef { id: Uuid::new_v4(), firm_id: firm };
        assert!(permits(Table::Advisors, Command::Select, &ctx(me, Some(firm)), colleague));
        assert!(!permits(Table::Advisors, Command::Update, &ctx(me, Some(firm)), colleague));
    }

    #[test]
    fn commands_without_policy_are_denied() {
        let firm = Uuid::new_v4();
        let me = Uuid::new_v4();
        let c = ctx(me, Some(firm));
        let own_firm = RowRef { id: firm, firm_id: firm };
        assert!(!permits(Table::Firms, Command::Insert, &c, own_firm));
        assert!(!permits(Table::Firms, Command::Delete, &c, own_firm));
        assert!(!permits(Table::Advisors, Command::Insert, &c, RowRef { id: me, firm_id: firm }));
        assert_eq!(violated_policy_name(Table::Advisors, Command::Insert), "advisors_insert_denied");
    }

    #[test]
    fn contacts_policies_cover_all_commands_by_firm() {
        let firm = Uuid::new_v4();
        let other = Uuid::new_v4();
        let c = ctx(Uuid::new_v4(), Some(firm));
        for cmd in Command::ALL {
            assert!(permits(Table::Contacts, cmd, &c, RowRef { id: Uuid::new_v4(), firm_id: firm }));
            assert!(!permits(Table::Contacts, cmd, &c, RowRef { id: Uuid::new_v4(), firm_id: other }));
            assert!(!permits(Table::Contacts, cmd, &ctx(Uuid::new_v4(), None), RowRef { id: Uuid::new_v4(), firm_id: firm }));
        }
    }

    #[test]
    fn ddl_contains_every_policy_once() {
        let ddl = policy_ddl();
        for p in ROW_POLICIES {
            assert_eq!(ddl.matches(&format!("CREATE POLICY {} ", p.name)).count(), 1, "{}", p.name);
        }
        assert!(ddl.contains("ALTER TABLE contacts ENABLE ROW LEVEL SECURITY"));
        assert!(ddl.contains(
            "CREATE POLICY contacts_insert_same_firm ON contacts FOR INSERT TO advisorhub_app WITH CHECK (firm_id = app_current_firm())"
        ));
        assert!(ddl.contains("CREATE POLICY firms_view_own ON firms FOR SELECT TO advisorhub_app USING (id = app_current_firm())"));
    }
}
