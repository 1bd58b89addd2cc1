// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Business rule validator.
//!
//! Stateless checks shared by the booking, payment and content entry points.
//! Every function returns `Ok(())` when the rule holds and a
//! [`BusinessRuleError`] naming the offending field otherwise.

use crate::base::{ContentType, Currency, ID_LENGTH, PaymentMethod, Provider, Role};
use crate::error::{BusinessRuleError, Rule};
use crate::model::Principal;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const MAX_PRICE_PER_PERSON: Decimal = dec!(100000);
pub const MAX_GROUP_SIZE: u32 = 100;
pub const MAX_TOUR_VALUE: Decimal = dec!(1000000);
pub const MAX_PAYMENT_AMOUNT: Decimal = dec!(1000000);

/// Fails unless the principal's role ranks at least as high as `required`.
pub fn validate_user_role(principal: &Principal, required: Role) -> Result<(), BusinessRuleError> {
    if principal.role.rank() >= required.rank() {
        return Ok(());
    }
    Err(BusinessRuleError::new(
        Rule::Permission,
        "role",
        format!("{} role required, caller is {}", required, principal.role),
    ))
}

pub fn validate_admin_access(principal: &Principal) -> Result<(), BusinessRuleError> {
    if principal.role == Role::Admin {
        return Ok(());
    }
    Err(BusinessRuleError::new(
        Rule::Permission,
        "role",
        "admin access required",
    ))
}

/// Checks tour pricing bounds.
///
/// Holds iff `1 <= price <= 100000`, `1 <= max_group_size <= 100` and
/// `price * max_group_size <= 1000000`.
pub fn validate_pricing(
    price_per_person: Decimal,
    max_group_size: u32,
) -> Result<(), BusinessRuleError> {
    if price_per_person < Decimal::ONE || price_per_person > MAX_PRICE_PER_PERSON {
        return Err(BusinessRuleError::new(
            Rule::Pricing,
            "price_per_person",
            format!("must be between 1 and {MAX_PRICE_PER_PERSON}"),
        ));
    }
    if max_group_size == 0 || max_group_size > MAX_GROUP_SIZE {
        return Err(BusinessRuleError::new(
            Rule::Pricing,
            "max_group_size",
            format!("must be between 1 and {MAX_GROUP_SIZE}"),
        ));
    }
    if price_per_person * Decimal::from(max_group_size) > MAX_TOUR_VALUE {
        return Err(BusinessRuleError::new(
            Rule::Pricing,
            "price_per_person",
            format!("price times group size exceeds {MAX_TOUR_VALUE}"),
        ));
    }
    Ok(())
}

/// Checks a payment request: amount range, currency and the provider/method pair.
///
/// Takes the raw request strings; matching is case-insensitive.
pub fn validate_payment(
    amount: Decimal,
    currency: &str,
    method: &str,
    provider: &str,
) -> Result<(), BusinessRuleError> {
    if amount <= Decimal::ZERO || amount > MAX_PAYMENT_AMOUNT {
        return Err(BusinessRuleError::new(
            Rule::Payment,
            "amount",
            format!("must be greater than 0 and at most {MAX_PAYMENT_AMOUNT}"),
        ));
    }
    currency.parse::<Currency>().map_err(|_| {
        BusinessRuleError::new(
            Rule::Payment,
            "currency",
            format!("unsupported currency '{currency}'"),
        )
    })?;
    let provider = provider.parse::<Provider>().map_err(|_| {
        BusinessRuleError::new(
            Rule::Payment,
            "provider",
            format!("unsupported provider '{provider}'"),
        )
    })?;
    let supported = method
        .parse::<PaymentMethod>()
        .is_ok_and(|method| provider.supports(method));
    if !supported {
        return Err(BusinessRuleError::new(
            Rule::Payment,
            "method",
            format!("{provider} does not accept '{method}'"),
        ));
    }
    Ok(())
}

/// Editorial content is managed by staff and admins only.
pub fn validate_content_management(
    principal: &Principal,
    content_type: &str,
) -> Result<(), BusinessRuleError> {
    if !matches!(principal.role, Role::Staff | Role::Admin) {
        return Err(BusinessRuleError::new(
            Rule::Permission,
            "role",
            "staff or admin role required to manage content",
        ));
    }
    content_type.parse::<ContentType>().map_err(|_| {
        BusinessRuleError::new(
            Rule::Content,
            "content_type",
            format!("unknown content type '{content_type}'"),
        )
    })?;
    Ok(())
}

/// Shape-only precondition on a pair of related identifiers.
///
/// Both ids must be non-empty after trimming and look like `c` followed by 24
/// lowercase alphanumerics. Existence is not checked.
pub fn validate_referential_integrity(
    entity_name: &str,
    entity_id: &str,
    related_entity_name: &str,
    related_entity_id: &str,
) -> Result<(), BusinessRuleError> {
    for (name, id) in [
        (entity_name, entity_id),
        (related_entity_name, related_entity_id),
    ] {
        let id = id.trim();
        if id.is_empty() {
            return Err(BusinessRuleError::new(
                Rule::Reference,
                "id",
                format!("{name} id is required"),
            ));
        }
        if !is_entity_id(id) {
            return Err(BusinessRuleError::new(
                Rule::Reference,
                "id",
                format!("{name} id '{id}' is malformed"),
            ));
        }
    }
    Ok(())
}

pub fn validate_rating(rating: u8) -> Result<(), BusinessRuleError> {
    if (1..=5).contains(&rating) {
        return Ok(());
    }
    Err(BusinessRuleError::new(
        Rule::Review,
        "rating",
        "must be between 1 and 5",
    ))
}

fn is_entity_id(id: &str) -> bool {
    id.len() == ID_LENGTH
        && id.starts_with('c')
        && id[1..]
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}
