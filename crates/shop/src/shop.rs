use serde::{Deserialize, Serialize};

use shopkit_core::{DataResult, Record, Row};

/// A shop row: `shop (id int PRIMARY KEY, name, location, state)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shop {
    pub id: i32,
    pub name: String,
    pub location: String,
    pub state: String,
}

impl Shop {
    pub fn new(
        id: i32,
        name: impl Into<String>,
        location: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            location: location.into(),
            state: state.into(),
        }
    }
}

/// Sparse form of [`Shop`]: filter example or update patch.
///
/// A `None` field is unconstrained (filter) or left untouched (patch).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl ShopFields {
    /// No constraints: matches every shop.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn by_id(id: i32) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: i32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Build a sparse form from a full record using the zero-value convention:
    /// `0` and `""` mean "not set".
    ///
    /// Only for callers that hold a complete `Shop` (e.g. a decoded request
    /// body); an empty string can never be expressed as a constraint this way.
    pub fn from_example(example: &Shop) -> Self {
        fn non_empty(s: &str) -> Option<String> {
            (!s.is_empty()).then(|| s.to_string())
        }

        Self {
            id: (example.id != 0).then_some(example.id),
            name: non_empty(&example.name),
            location: non_empty(&example.location),
            state: non_empty(&example.state),
        }
    }

    /// Whether `shop` satisfies every present field.
    pub fn matches(&self, shop: &Shop) -> bool {
        self.id.is_none_or(|id| id == shop.id)
            && self.name.as_ref().is_none_or(|n| *n == shop.name)
            && self.location.as_ref().is_none_or(|l| *l == shop.location)
            && self.state.as_ref().is_none_or(|s| *s == shop.state)
    }

    /// Apply as a patch: present fields overwrite, absent fields keep `shop`'s value.
    pub fn apply_to(&self, shop: &Shop) -> Shop {
        Shop {
            id: self.id.unwrap_or(shop.id),
            name: self.name.clone().unwrap_or_else(|| shop.name.clone()),
            location: self.location.clone().unwrap_or_else(|| shop.location.clone()),
            state: self.state.clone().unwrap_or_else(|| shop.state.clone()),
        }
    }
}

impl From<&Shop> for ShopFields {
    /// Every field present.
    fn from(shop: &Shop) -> Self {
        Self {
            id: Some(shop.id),
            name: Some(shop.name.clone()),
            location: Some(shop.location.clone()),
            state: Some(shop.state.clone()),
        }
    }
}

impl Record for Shop {
    type Fields = ShopFields;

    const TABLE: &'static str = "shop";
    const KEY: &'static str = "id";
    const COLUMNS: &'static [&'static str] = &["id", "name", "location", "state"];

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("location", self.location.as_str())
            .with("state", self.state.as_str())
    }

    fn from_row(row: &Row) -> DataResult<Self> {
        let id = row.int("id")?;
        let id = i32::try_from(id).map_err(|_| {
            shopkit_core::DataError::deserialization(format!("shop id out of range: {id}"))
        })?;

        Ok(Self {
            id,
            name: row.text("name")?,
            location: row.text("location")?,
            state: row.text("state")?,
        })
    }

    fn present(fields: &ShopFields) -> Row {
        let mut row = Row::new();
        if let Some(id) = fields.id {
            row.set("id", id);
        }
        if let Some(name) = &fields.name {
            row.set("name", name.as_str());
        }
        if let Some(location) = &fields.location {
            row.set("location", location.as_str());
        }
        if let Some(state) = &fields.state {
            row.set("state", state.as_str());
        }
        row
    }

    fn key(&self) -> shopkit_core::Value {
        shopkit_core::Value::from(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shopkit_core::{DataError, Value};

    fn pramod() -> Shop {
        Shop::new(1, "Pramod", "Gaya", "Bihar")
    }

    #[test]
    fn row_round_trip_preserves_every_column() {
        let shop = pramod();
        let row = shop.to_row();
        assert_eq!(row.len(), Shop::COLUMNS.len());
        assert_eq!(Shop::from_row(&row).unwrap(), shop);
    }

    #[test]
    fn present_lists_only_set_fields_in_column_order() {
        let fields = ShopFields::any().state("Bihar").id(2);
        let row = Shop::present(&fields);
        let cols: Vec<_> = row.iter().map(|(c, _)| c.to_string()).collect();
        assert_eq!(cols, vec!["id", "state"]);
        assert_eq!(Shop::key_of(&fields), Some(Value::Int(2)));
    }

    #[test]
    fn explicit_empty_string_is_a_constraint() {
        let fields = ShopFields::any().name("");
        assert!(Shop::present(&fields).contains("name"));
        assert!(!fields.matches(&pramod()));
    }

    #[test]
    fn from_example_treats_zero_values_as_unset() {
        let fields = ShopFields::from_example(&Shop {
            name: "Pramod".into(),
            ..Shop::default()
        });
        assert_eq!(fields, ShopFields::any().name("Pramod"));
        assert_eq!(ShopFields::from_example(&Shop::default()), ShopFields::any());
    }

    #[test]
    fn from_row_rejects_out_of_range_ids() {
        let row = pramod().to_row().with("id", i64::MAX);
        assert!(matches!(
            Shop::from_row(&row),
            Err(DataError::DeserializationFailure(_))
        ));
    }

    #[test]
    fn fields_deserialize_from_sparse_json() {
        let fields: ShopFields = serde_json::from_str(r#"{"location":"Gaya"}"#).unwrap();
        assert_eq!(fields, ShopFields::any().location("Gaya"));
    }

    fn arb_shop() -> impl Strategy<Value = Shop> {
        (0i32..5, "[a-c]{0,2}", "[a-c]{0,2}", "[a-c]{0,2}")
            .prop_map(|(id, name, location, state)| Shop { id, name, location, state })
    }

    fn arb_fields() -> impl Strategy<Value = ShopFields> {
        (
            proptest::option::of(0i32..5),
            proptest::option::of("[a-c]{0,2}"),
            proptest::option::of("[a-c]{0,2}"),
            proptest::option::of("[a-c]{0,2}"),
        )
            .prop_map(|(id, name, location, state)| ShopFields { id, name, location, state })
    }

    proptest! {
        /// Property: a patch leaves absent fields untouched and sets present ones.
        #[test]
        fn apply_to_is_a_pure_merge(shop in arb_shop(), patch in arb_fields()) {
            let merged = patch.apply_to(&shop);
            prop_assert_eq!(merged.id, patch.id.unwrap_or(shop.id));
            prop_assert_eq!(&merged.name, patch.name.as_ref().unwrap_or(&shop.name));
            prop_assert_eq!(&merged.location, patch.location.as_ref().unwrap_or(&shop.location));
            prop_assert_eq!(&merged.state, patch.state.as_ref().unwrap_or(&shop.state));
        }

        /// Property: a full sparse form matches exactly its own record.
        #[test]
        fn full_fields_match_only_equal_records(a in arb_shop(), b in arb_shop()) {
            let fields = ShopFields::from(&a);
            prop_assert!(fields.matches(&a));
            prop_assert_eq!(fields.matches(&b), a == b);
        }
    }
}
