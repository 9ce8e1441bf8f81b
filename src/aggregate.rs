use std::collections::BTreeMap;

use serde::Serialize;

use crate::cart_repo::CartIngredientLine;

/// One line of the shopping list: an ingredient summed across the whole cart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AggregateRow {
    pub ingredient_name: String,
    pub measurement_unit: String,
    pub total_amount: i64,
}

/// Sums amounts per `(name, unit)`; rows come out sorted by that pair.
///
/// The same ingredient in two different units stays two rows.
pub fn aggregate<I>(lines: I) -> Vec<AggregateRow>
where
    I: IntoIterator<Item = CartIngredientLine>,
{
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for CartIngredientLine {
        name,
        measurement_unit,
        amount,
    } in lines
    {
        *totals.entry((name, measurement_unit)).or_default() += i64::from(amount);
    }

    totals
        .into_iter()
        .map(
            |((ingredient_name, measurement_unit), total_amount)| AggregateRow {
                ingredient_name,
                measurement_unit,
                total_amount,
            },
        )
        .collect()
}
