//! Order Aggregate
//!
//! Checkout is a linear wizard: Shipping -> Payment -> Review -> Placed.
//! Forward moves are gated by form validation, backward moves never are.

use std::borrow::Cow;
use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::domain::aggregates::{CartLine, Product};
use crate::domain::events::{CheckoutEvent, DomainEvent};
use crate::domain::value_objects::Money;

const FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(500, 0, 0, false, 0);
const FLAT_SHIPPING: Decimal = Decimal::from_parts(25, 0, 0, false, 0);
const TAX_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 2);
const MIN_CARD_DIGITS: usize = 16;
const MIN_CVV_LEN: usize = 3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutStep {
    #[default]
    Shipping,
    Payment,
    Review,
    Placed,
}

impl CheckoutStep {
    pub fn number(self) -> u8 {
        match self { Self::Shipping => 1, Self::Payment => 2, Self::Review => 3, Self::Placed => 4 }
    }

    pub fn title(self) -> &'static str {
        match self { Self::Shipping => "Shipping", Self::Payment => "Payment", Self::Review => "Review", Self::Placed => "Placed" }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShippingInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

impl Default for ShippingInfo {
    fn default() -> Self {
        Self {
            first_name: String::new(), last_name: String::new(), email: String::new(), phone: String::new(),
            address: String::new(), city: String::new(), state: String::new(), zip_code: String::new(),
            country: "United States".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentInfo {
    pub card_number: String,
    pub expiry_date: String,
    pub cvv: String,
    pub card_name: String,
    pub billing_address: String,
    pub billing_city: String,
    pub billing_state: String,
    pub billing_zip_code: String,
    pub same_as_shipping: bool,
}

impl Default for PaymentInfo {
    fn default() -> Self {
        Self {
            card_number: String::new(), expiry_date: String::new(), cvv: String::new(), card_name: String::new(),
            billing_address: String::new(), billing_city: String::new(), billing_state: String::new(),
            billing_zip_code: String::new(), same_as_shipping: true,
        }
    }
}

fn field_error(errors: &mut ValidationErrors, field: &'static str, code: &'static str, message: &'static str) {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    errors.add(field, err);
}

fn require(errors: &mut ValidationErrors, field: &'static str, value: &str, message: &'static str) -> bool {
    if value.trim().is_empty() {
        field_error(errors, field, "required", message);
        return false;
    }
    true
}

fn into_result(errors: ValidationErrors) -> Result<(), ValidationErrors> {
    if errors.errors().is_empty() { Ok(()) } else { Err(errors) }
}

impl Validate for ShippingInfo {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        require(&mut errors, "firstName", &self.first_name, "First name is required");
        require(&mut errors, "lastName", &self.last_name, "Last name is required");
        if require(&mut errors, "email", &self.email, "Email is required") && !validator::validate_email(self.email.trim()) {
            field_error(&mut errors, "email", "email", "Email is invalid");
        }
        require(&mut errors, "phone", &self.phone, "Phone is required");
        require(&mut errors, "address", &self.address, "Address is required");
        require(&mut errors, "city", &self.city, "City is required");
        require(&mut errors, "state", &self.state, "State is required");
        require(&mut errors, "zipCode", &self.zip_code, "ZIP code is required");
        into_result(errors)
    }
}

impl Validate for PaymentInfo {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if require(&mut errors, "cardNumber", &self.card_number, "Card number is required") {
            let well_formed = self.card_number.chars().all(|c| c.is_ascii_digit() || c.is_whitespace() || c == '-');
            let digits = self.card_number.chars().filter(char::is_ascii_digit).count();
            if !well_formed || digits < MIN_CARD_DIGITS {
                field_error(&mut errors, "cardNumber", "length", "Card number is invalid");
            }
        }
        require(&mut errors, "expiryDate", &self.expiry_date, "Expiry date is required");
        if require(&mut errors, "cvv", &self.cvv, "CVV is required") && self.cvv.trim().len() < MIN_CVV_LEN {
            field_error(&mut errors, "cvv", "length", "CVV is invalid");
        }
        require(&mut errors, "cardName", &self.card_name, "Cardholder name is required");
        if !self.same_as_shipping {
            require(&mut errors, "billingAddress", &self.billing_address, "Billing address is required");
            require(&mut errors, "billingCity", &self.billing_city, "Billing city is required");
            require(&mut errors, "billingState", &self.billing_state, "Billing state is required");
            require(&mut errors, "billingZipCode", &self.billing_zip_code, "Billing ZIP code is required");
        }
        into_result(errors)
    }
}

/// Flattens validator output to one message per field.
pub fn error_messages(errors: &ValidationErrors) -> BTreeMap<String, String> {
    errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| {
            let message = errs.first()?.message.as_ref()?.to_string();
            Some((field.to_string(), message))
        })
        .collect()
}

/// Groups card digits in fours, dropping anything that is not a digit.
pub fn format_card_number(value: &str) -> String {
    let digits: Vec<char> = value.chars().filter(char::is_ascii_digit).take(MIN_CARD_DIGITS).collect();
    digits.chunks(4).map(|chunk| chunk.iter().collect::<String>()).collect::<Vec<_>>().join(" ")
}

/// `**** **** **** 1234` style rendering for the review step.
pub fn masked_card(value: &str) -> String {
    let digits: Vec<char> = value.chars().filter(char::is_ascii_digit).collect();
    let last4: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("**** **** **** {last4}")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub item_count: u32,
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
}

impl OrderSummary {
    /// Lines whose product is unknown contribute nothing to the subtotal.
    pub fn compute(lines: &[CartLine], products: &[Product]) -> Self {
        let subtotal = lines.iter().fold(Money::zero("USD"), |acc, line| {
            match products.iter().find(|p| p.id == line.product_id) {
                Some(product) => acc.add(&line.line_total(product)).unwrap_or(acc),
                None => acc,
            }
        });
        let shipping = if subtotal.amount() > FREE_SHIPPING_THRESHOLD { Money::zero("USD") } else { Money::usd(FLAT_SHIPPING) };
        let tax = subtotal.scale(TAX_RATE);
        let total = Money::usd(subtotal.amount() + shipping.amount() + tax.amount());
        Self { item_count: lines.iter().map(|l| l.quantity).sum(), subtotal, shipping, tax, total }
    }
}

/// The checkout wizard state.
#[derive(Clone, Debug, Default)]
pub struct Checkout {
    step: CheckoutStep,
    shipping: ShippingInfo,
    payment: PaymentInfo,
    errors: BTreeMap<String, String>,
    events: Vec<DomainEvent>,
}

impl Checkout {
    pub fn new() -> Self { Self::default() }

    pub fn step(&self) -> CheckoutStep { self.step }
    pub fn shipping(&self) -> &ShippingInfo { &self.shipping }
    pub fn payment(&self) -> &PaymentInfo { &self.payment }
    pub fn errors(&self) -> &BTreeMap<String, String> { &self.errors }

    /// Replaces the shipping form, clearing errors of fields that changed.
    pub fn set_shipping(&mut self, shipping: ShippingInfo) {
        let before = serde_json::to_value(&self.shipping).ok();
        let after = serde_json::to_value(&shipping).ok();
        self.clear_changed_errors(before, after);
        self.shipping = shipping;
    }

    /// Replaces the payment form, clearing errors of fields that changed.
    pub fn set_payment(&mut self, payment: PaymentInfo) {
        let before = serde_json::to_value(&self.payment).ok();
        let after = serde_json::to_value(&payment).ok();
        self.clear_changed_errors(before, after);
        self.payment = payment;
    }

    fn clear_changed_errors(&mut self, before: Option<serde_json::Value>, after: Option<serde_json::Value>) {
        let (Some(before), Some(after)) = (before, after) else { return };
        self.errors.retain(|field, _| before.get(field) == after.get(field));
    }

    /// Advances one step if the current form validates; otherwise records its errors and stays.
    pub fn next_step(&mut self) -> CheckoutStep {
        let validation = match self.step {
            CheckoutStep::Shipping => self.shipping.validate(),
            CheckoutStep::Payment => self.payment.validate(),
            CheckoutStep::Review | CheckoutStep::Placed => return self.step,
        };
        match validation {
            Ok(()) => {
                self.errors.clear();
                let from = self.step;
                self.step = match from {
                    CheckoutStep::Shipping => CheckoutStep::Payment,
                    _ => CheckoutStep::Review,
                };
                self.events.push(DomainEvent::Checkout(CheckoutEvent::StepCompleted { step: from }));
            }
            Err(errors) => self.errors = error_messages(&errors),
        }
        self.step
    }

    pub fn prev_step(&mut self) -> CheckoutStep {
        self.step = match self.step {
            CheckoutStep::Payment => CheckoutStep::Shipping,
            CheckoutStep::Review => CheckoutStep::Payment,
            other => other,
        };
        self.step
    }

    /// Marks the order placed. Only valid from Review.
    pub fn mark_placed(&mut self, order_number: &str, total: &Money) -> Result<(), OrderError> {
        if self.step != CheckoutStep::Review { return Err(OrderError::NotReviewed(self.step)); }
        self.step = CheckoutStep::Placed;
        self.events.push(DomainEvent::Checkout(CheckoutEvent::OrderPlaced {
            order_number: order_number.to_string(),
            total: total.amount(),
        }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("Order can only be placed from the review step (currently {})", .0.title())]
    NotReviewed(CheckoutStep),
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn shipping() -> ShippingInfo {
        ShippingInfo {
            first_name: "Asha".into(), last_name: "Rao".into(), email: "asha@example.com".into(),
            phone: "555-0100".into(), address: "1 Main St".into(), city: "Austin".into(),
            state: "TX".into(), zip_code: "73301".into(), ..ShippingInfo::default()
        }
    }

    pub fn payment() -> PaymentInfo {
        PaymentInfo {
            card_number: "4242 4242 4242 4242".into(), expiry_date: "12/30".into(), cvv: "123".into(),
            card_name: "Asha Rao".into(), ..PaymentInfo::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::fixtures::{payment, shipping};
    use crate::domain::aggregates::product::fixtures::product;
    use crate::domain::value_objects::{LineId, ProductId};

    #[test]
    fn test_empty_email_stays_on_shipping() {
        let mut checkout = Checkout::new();
        checkout.set_shipping(ShippingInfo { email: String::new(), ..shipping() });
        assert_eq!(checkout.next_step(), CheckoutStep::Shipping);
        assert_eq!(checkout.errors().get("email").map(String::as_str), Some("Email is required"));
    }

    #[test]
    fn test_invalid_email() {
        let mut checkout = Checkout::new();
        checkout.set_shipping(ShippingInfo { email: "not-an-email".into(), ..shipping() });
        checkout.next_step();
        assert_eq!(checkout.errors().get("email").map(String::as_str), Some("Email is invalid"));
    }

    #[test]
    fn test_full_forward_flow() {
        let mut checkout = Checkout::new();
        checkout.set_shipping(shipping());
        assert_eq!(checkout.next_step(), CheckoutStep::Payment);
        checkout.set_payment(payment());
        assert_eq!(checkout.next_step(), CheckoutStep::Review);
        assert!(checkout.errors().is_empty());
        assert_eq!(checkout.next_step(), CheckoutStep::Review);
        assert_eq!(checkout.take_events().len(), 2);
    }

    #[test]
    fn test_short_card_and_cvv_rejected() {
        let info = PaymentInfo { card_number: "4242 4242".into(), cvv: "12".into(), ..payment() };
        let messages = error_messages(&info.validate().unwrap_err());
        assert_eq!(messages.get("cardNumber").map(String::as_str), Some("Card number is invalid"));
        assert_eq!(messages.get("cvv").map(String::as_str), Some("CVV is invalid"));
    }

    #[test]
    fn test_card_number_must_be_digits() {
        let letters = PaymentInfo { card_number: "abcd efgh ijkl mnop".into(), ..payment() };
        let messages = error_messages(&letters.validate().unwrap_err());
        assert_eq!(messages.get("cardNumber").map(String::as_str), Some("Card number is invalid"));

        let padded = PaymentInfo { card_number: "4242-4242-4242-424x2".into(), ..payment() };
        assert!(padded.validate().is_err());
        assert!(PaymentInfo { card_number: "4242-4242-4242-4242".into(), ..payment() }.validate().is_ok());
    }

    #[test]
    fn test_separate_billing_requires_address() {
        let info = PaymentInfo { same_as_shipping: false, ..payment() };
        let messages = error_messages(&info.validate().unwrap_err());
        assert_eq!(messages.len(), 4);
        assert!(messages.contains_key("billingZipCode"));
    }

    #[test]
    fn test_prev_step_is_unconditional() {
        let mut checkout = Checkout::new();
        assert_eq!(checkout.prev_step(), CheckoutStep::Shipping);
        checkout.set_shipping(shipping());
        checkout.next_step();
        assert_eq!(checkout.prev_step(), CheckoutStep::Shipping);
    }

    #[test]
    fn test_editing_field_clears_its_error() {
        let mut checkout = Checkout::new();
        checkout.next_step();
        assert!(checkout.errors().contains_key("city"));
        checkout.set_shipping(ShippingInfo { city: "Austin".into(), ..ShippingInfo::default() });
        assert!(!checkout.errors().contains_key("city"));
        assert!(checkout.errors().contains_key("email"));
    }

    #[test]
    fn test_mark_placed_requires_review() {
        let mut checkout = Checkout::new();
        assert_eq!(checkout.mark_placed("ORD-1", &Money::default()), Err(OrderError::NotReviewed(CheckoutStep::Shipping)));
    }

    #[test]
    fn test_summary_totals() {
        let products = vec![product(1, "Band", 100), product(2, "Chain", 450)];
        let line = |id, pid, qty| CartLine { id: LineId(id), product_id: ProductId(pid), quantity: qty, size: None, added_at: chrono::Utc::now() };

        let small = OrderSummary::compute(&[line(1, 1, 2)], &products);
        assert_eq!(small.subtotal.amount(), Decimal::new(200, 0));
        assert_eq!(small.shipping.amount(), Decimal::new(25, 0));
        assert_eq!(small.tax.amount(), Decimal::new(16, 0));
        assert_eq!(small.total.amount(), Decimal::new(241, 0));

        let large = OrderSummary::compute(&[line(1, 1, 1), line(2, 2, 1), line(3, 99, 5)], &products);
        assert_eq!(large.subtotal.amount(), Decimal::new(550, 0));
        assert_eq!(large.shipping.amount(), Decimal::ZERO);
        assert_eq!(large.item_count, 7);
    }

    #[test]
    fn test_card_formatting() {
        assert_eq!(format_card_number("4242-4242 4242424299"), "4242 4242 4242 4242");
        assert_eq!(masked_card("4242 4242 4242 1881"), "**** **** **** 1881");
    }
}
