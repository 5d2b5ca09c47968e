//! 示例数据：无数据库或空库时使用

use crate::catalog::{CatalogEntry, Order};

pub fn foods() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new(1, "Margherita Pizza", "Pizza", "Luigi's Trattoria", 12.5),
        CatalogEntry::new(2, "Pepperoni Pizza", "Pizza", "Luigi's Trattoria", 14.0),
        CatalogEntry::new(3, "Pizza", "Pizza", "Napoli Express", 10.0),
        CatalogEntry::new(4, "Spaghetti Carbonara", "Pasta", "Luigi's Trattoria", 13.0),
        CatalogEntry::new(5, "Lasagna", "Pasta", "Napoli Express", 11.5),
        CatalogEntry::new(6, "Chicken Burger", "Burger", "Burger Barn", 9.0),
        CatalogEntry::new(7, "Cheeseburger", "Burger", "Burger Barn", 8.5),
        CatalogEntry::new(8, "Veggie Burger", "Burger", "Green Bowl", 9.5),
        CatalogEntry::new(9, "Caesar Salad", "Salad", "Green Bowl", 7.5),
        CatalogEntry::new(10, "Greek Salad", "Salad", "Green Bowl", 7.0),
        CatalogEntry::new(11, "Salmon Sushi", "Sushi", "Tokyo Bento", 16.0),
        CatalogEntry::new(12, "Chicken Teriyaki", "Rice", "Tokyo Bento", 12.0),
        CatalogEntry::new(13, "Pad Thai", "Noodles", "Bangkok Street", 11.0),
        CatalogEntry::new(14, "Green Curry", "Curry", "Bangkok Street", 12.5),
        CatalogEntry::new(15, "Falafel Wrap", "Wrap", "Levant Kitchen", 8.0),
        CatalogEntry::new(16, "Chicken Shawarma", "Wrap", "Levant Kitchen", 9.5),
    ]
}

pub fn orders() -> Vec<Order> {
    vec![
        Order::new(1, "123-456-7890", "Alice", "preparation"),
        Order::new(2, "987-654-3210", "Bob", "delivered"),
        Order::new(3, "555-000-1111", "Carol", "on the way"),
        Order::new(42, "555-1234", "Dave", "preparation"),
    ]
}

pub fn documents() -> Vec<String> {
    [
        "Olive oil should be stored in a cool, dark place away from heat; once opened it keeps its best flavour for about three months.",
        "Avocados are rich in monounsaturated fats, fibre and potassium; a medium avocado has roughly 240 calories.",
        "Cooked rice must be cooled quickly and refrigerated within one hour; reheat it only once until steaming hot.",
        "Fresh salmon for sushi should be frozen at -20 C for at least 24 hours before serving raw to kill parasites.",
        "Margherita pizza contains wheat flour, tomato, mozzarella and basil; it is vegetarian but not gluten free.",
        "Pad thai usually contains peanuts, egg, fish sauce and shrimp; ask for a version without peanuts if you have an allergy.",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
