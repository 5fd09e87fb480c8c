/// Types that own a table managed by the model registry
pub trait Model {
    fn descriptor() -> ModelDescriptor;
}

/// SQLite storage class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
    Blob,
    Timestamp,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Blob => "BLOB",
            ColumnType::Timestamp => "DATETIME",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// Table name plus the columns auto-migration keeps in sync.
///
/// Every table also gets an `id INTEGER PRIMARY KEY AUTOINCREMENT` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    table: String,
    columns: Vec<Column>,
}

impl ModelDescriptor {
    pub const PRIMARY_KEY: &'static str = "id";

    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    /// Descriptor named after the type: `UserProfile` becomes `user_profiles`
    pub fn for_type<T: ?Sized>() -> Self {
        Self::new(default_table_name(std::any::type_name::<T>()))
    }

    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(Column {
            name: name.into(),
            column_type,
        });
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

fn default_table_name(type_path: &str) -> String {
    // Drop generics and the module path
    let base = type_path.split('<').next().unwrap_or(type_path);
    let name = base.rsplit("::").next().unwrap_or(base);

    let mut table = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                table.push('_');
            }
            table.extend(ch.to_lowercase());
        } else {
            table.push(ch);
        }
    }
    table.push('s');
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    struct B;
    struct UserProfile;

    #[test]
    fn default_table_names_are_snake_case_plural() {
        assert_eq!(ModelDescriptor::for_type::<B>().table(), "bs");
        assert_eq!(ModelDescriptor::for_type::<UserProfile>().table(), "user_profiles");
        assert_eq!(ModelDescriptor::for_type::<Vec<B>>().table(), "vecs");
    }

    #[test]
    fn columns_keep_declaration_order() {
        let descriptor = ModelDescriptor::new("abc")
            .column("data_x", ColumnType::Text)
            .column("data_y", ColumnType::Integer);

        let names: Vec<_> = descriptor.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["data_x", "data_y"]);
        assert_eq!(descriptor.columns()[1].column_type.sql_type(), "INTEGER");
    }
}
