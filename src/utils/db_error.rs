/// Name of the filtered unique index guarding active short codes.
pub const ACTIVE_CODE_CONSTRAINT: &str = "ux_url_mappings_active_code";

pub fn is_unique_violation_on_active_code(e: &sqlx::Error) -> bool {
    let Some(db_err) = e.as_database_error() else {
        return false;
    };

    if !db_err.is_unique_violation() {
        return false;
    }

    matches!(db_err.constraint(), Some(ACTIVE_CODE_CONSTRAINT))
}
