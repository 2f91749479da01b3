//! Migrations shipped with the runner

mod add_address_for_users;
mod add_email_for_users;
mod create_users_table;

use elif_migrate::MigrationDefinition;

/// Every registered migration; order does not matter, versions do
pub fn all() -> Vec<MigrationDefinition> {
    vec![
        create_users_table::migration(),
        add_email_for_users::migration(),
        add_address_for_users::migration(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use elif_migrate::MigrationSet;

    #[test]
    fn test_registered_migrations_are_valid() {
        let set = MigrationSet::new(all()).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.highest_version(), 3);
    }
}
