//! Keyword-based shopping categories for ingredient names.
//!
//! Rules are checked top to bottom and the first rule with a keyword that
//! occurs in the lowercased name wins. The leading override rules hold
//! multi-word keywords whose words would otherwise be claimed by an
//! earlier category ("ice cream" is Frozen, not Dairy).

use std::fmt;

use serde::{Serialize, Serializer};

/// Shopping category. Declaration order is display order, `Other` last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Produce,
    Dairy,
    MeatSeafood,
    Pantry,
    Spices,
    Baking,
    Beverages,
    Frozen,
    Other,
}

impl Category {
    pub const DISPLAY_ORDER: [Category; 9] = [
        Category::Produce,
        Category::Dairy,
        Category::MeatSeafood,
        Category::Pantry,
        Category::Spices,
        Category::Baking,
        Category::Beverages,
        Category::Frozen,
        Category::Other,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Category::Produce => "Produce",
            Category::Dairy => "Dairy",
            Category::MeatSeafood => "Meat & Seafood",
            Category::Pantry => "Pantry",
            Category::Spices => "Spices",
            Category::Baking => "Baking",
            Category::Beverages => "Beverages",
            Category::Frozen => "Frozen",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

struct Rule {
    keywords: &'static [&'static str],
    category: Category,
}

const RULES: &[Rule] = &[
    // overrides
    Rule {
        keywords: &["ice cream", "frozen"],
        category: Category::Frozen,
    },
    Rule {
        keywords: &["baking powder", "baking soda", "cornstarch", "chocolate chip"],
        category: Category::Baking,
    },
    Rule {
        keywords: &["peanut butter", "coconut milk", "soy sauce"],
        category: Category::Pantry,
    },
    Rule {
        keywords: &["black pepper", "red pepper flakes", "bay leaf", "chili powder"],
        category: Category::Spices,
    },
    // categories
    Rule {
        keywords: &[
            "tomato", "lettuce", "onion", "garlic", "carrot", "celery", "bell pepper",
            "jalapeno", "cucumber", "zucchini", "potato", "spinach", "kale", "cabbage",
            "broccoli", "cauliflower", "mushroom", "avocado", "corn", "eggplant", "squash",
            "apple", "banana", "orange", "lemon", "lime", "berry", "berries", "grape", "mango",
            "pineapple", "basil", "parsley", "cilantro", "mint", "thyme", "rosemary", "herb",
        ],
        category: Category::Produce,
    },
    Rule {
        keywords: &[
            "milk", "cheese", "butter", "cream", "yogurt", "mozzarella", "cheddar",
            "parmesan", "feta", "ricotta",
        ],
        category: Category::Dairy,
    },
    Rule {
        keywords: &[
            "chicken", "beef", "pork", "turkey", "steak", "lamb", "bacon", "sausage", "ham",
            "fish", "salmon", "tuna", "cod", "shrimp", "prawn", "crab", "lobster", "scallop",
        ],
        category: Category::MeatSeafood,
    },
    Rule {
        keywords: &[
            "flour", "sugar", "salt", "rice", "pasta", "noodle", "bread", "oil", "vinegar",
            "cereal", "oat", "quinoa", "bean", "lentil", "chickpea", "honey", "broth", "stock",
        ],
        category: Category::Pantry,
    },
    Rule {
        keywords: &[
            "pepper", "cumin", "paprika", "cinnamon", "nutmeg", "ginger", "turmeric",
            "coriander", "cardamom", "clove", "oregano", "cayenne", "chili",
        ],
        category: Category::Spices,
    },
    Rule {
        keywords: &["yeast", "vanilla", "cocoa", "chocolate"],
        category: Category::Baking,
    },
    Rule {
        keywords: &["juice", "coffee", "tea", "soda", "water", "wine"],
        category: Category::Beverages,
    },
];

/// Map an ingredient name to its shopping category. Never fails; names
/// that match no rule are `Other`.
#[must_use]
pub fn classify(ingredient_name: &str) -> Category {
    let name = ingredient_name.trim().to_lowercase();
    if name.is_empty() {
        return Category::Other;
    }
    RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| name.contains(kw)))
        .map_or(Category::Other, |rule| rule.category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_categories() {
        assert_eq!(classify("Tomatoes"), Category::Produce);
        assert_eq!(classify("whole milk"), Category::Dairy);
        assert_eq!(classify("chicken thighs"), Category::MeatSeafood);
        assert_eq!(classify("flour"), Category::Pantry);
        assert_eq!(classify("salt"), Category::Pantry);
        assert_eq!(classify("ground cumin"), Category::Spices);
        assert_eq!(classify("active dry yeast"), Category::Baking);
        assert_eq!(classify("orange juice"), Category::Produce);
        assert_eq!(classify("coffee"), Category::Beverages);
    }

    #[test]
    fn test_overrides_beat_single_words() {
        assert_eq!(classify("vanilla ice cream"), Category::Frozen);
        assert_eq!(classify("frozen peas"), Category::Frozen);
        assert_eq!(classify("sour cream"), Category::Dairy);
        assert_eq!(classify("baking powder"), Category::Baking);
        assert_eq!(classify("peanut butter"), Category::Pantry);
        assert_eq!(classify("freshly ground black pepper"), Category::Spices);
        assert_eq!(classify("red bell pepper"), Category::Produce);
    }

    #[test]
    fn test_unmatched_is_other() {
        assert_eq!(classify("egg"), Category::Other);
        assert_eq!(classify(""), Category::Other);
        assert_eq!(classify("   "), Category::Other);
    }

    #[test]
    fn test_case_and_whitespace_insensitive() {
        assert_eq!(classify("  FLOUR "), classify("flour"));
    }

    #[test]
    fn test_display_order_puts_other_last() {
        let mut sorted = Category::DISPLAY_ORDER.to_vec();
        sorted.sort();
        assert_eq!(sorted, Category::DISPLAY_ORDER.to_vec());
        assert_eq!(sorted.last(), Some(&Category::Other));
    }

    #[test]
    fn test_serializes_as_label() {
        assert_eq!(
            serde_json::to_string(&Category::MeatSeafood).unwrap(),
            "\"Meat & Seafood\""
        );
    }
}
