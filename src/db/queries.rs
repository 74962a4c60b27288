use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    AvailabilitySlot, Booking, BookingPatch, BookingStatus, NewBooking, Payment, PaymentStatus,
    Resource, TimeInterval, User,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BOOKING_COLUMNS: &str = "b.id, b.resource_id, b.slot_id, b.customer_id, b.customer_name, \
     b.customer_email, b.customer_phone, b.customer_zip, b.start_time, b.end_time, b.status, \
     b.payment_status, b.final_amount, b.provider_event_id, b.customer_event_id, b.reminded_at, \
     b.created_at, b.updated_at";

pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).with_context(|| format!("bad timestamp: {s}"))
}

// ── Users ──

pub fn create_user(
    conn: &Connection,
    email: &str,
    first_name: &str,
    last_name: &str,
    phone: Option<&str>,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO users (email, first_name, last_name, phone) VALUES (?1, ?2, ?3, ?4)",
        params![email, first_name, last_name, phone],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_user(conn: &Connection, id: i64) -> anyhow::Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, email, first_name, last_name, phone FROM users WHERE id = ?1",
            params![id],
            parse_user_row,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> anyhow::Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, email, first_name, last_name, phone FROM users WHERE lower(email) = lower(?1)",
            params![email.trim()],
            parse_user_row,
        )
        .optional()?;
    Ok(user)
}

fn parse_user_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        phone: row.get(4)?,
    })
}

// ── Resources & Slots ──

pub fn create_resource(
    conn: &Connection,
    provider_id: i64,
    name: &str,
    price: Option<f64>,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO resources (provider_id, name, price) VALUES (?1, ?2, ?3)",
        params![provider_id, name, price],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_resource(conn: &Connection, id: i64) -> anyhow::Result<Option<Resource>> {
    let resource = conn
        .query_row(
            "SELECT id, provider_id, name, description, price FROM resources WHERE id = ?1",
            params![id],
            |row| {
                Ok(Resource {
                    id: row.get(0)?,
                    provider_id: row.get(1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                    price: row.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(resource)
}

pub fn create_slot(
    conn: &Connection,
    resource_id: i64,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO availability_slots (resource_id, slot_date, start_time, end_time)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            resource_id,
            date.format("%Y-%m-%d").to_string(),
            start.format("%H:%M:%S").to_string(),
            end.format("%H:%M:%S").to_string(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_slot(conn: &Connection, id: i64) -> anyhow::Result<Option<AvailabilitySlot>> {
    let raw = conn
        .query_row(
            "SELECT id, resource_id, slot_date, start_time, end_time FROM availability_slots WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((id, resource_id, date, start, end)) = raw else {
        return Ok(None);
    };

    Ok(Some(AvailabilitySlot {
        id,
        resource_id,
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .with_context(|| format!("bad slot date: {date}"))?,
        start: NaiveTime::parse_from_str(&start, "%H:%M:%S")
            .with_context(|| format!("bad slot start: {start}"))?,
        end: NaiveTime::parse_from_str(&end, "%H:%M:%S")
            .with_context(|| format!("bad slot end: {end}"))?,
    }))
}

// ── Bookings ──

pub fn insert_booking(
    conn: &Connection,
    booking: &NewBooking,
    now: &NaiveDateTime,
) -> anyhow::Result<i64> {
    let now = format_ts(now);
    conn.execute(
        "INSERT INTO bookings (resource_id, slot_id, customer_id, customer_name, customer_email,
            customer_phone, customer_zip, start_time, end_time, status, payment_status,
            final_amount, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        params![
            booking.resource_id,
            booking.slot_id,
            booking.customer_id,
            booking.customer_name,
            booking.customer_email,
            booking.customer_phone,
            booking.customer_zip,
            format_ts(&booking.interval.start()),
            format_ts(&booking.interval.end()),
            booking.status.as_str(),
            booking.payment_status.as_str(),
            booking.final_amount,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

// Clears reminded_at when the interval moved.
pub fn update_booking(
    conn: &Connection,
    id: i64,
    booking: &NewBooking,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let start = format_ts(&booking.interval.start());
    let end = format_ts(&booking.interval.end());
    let count = conn.execute(
        "UPDATE bookings SET
            resource_id = ?1, slot_id = ?2, customer_id = ?3, customer_name = ?4,
            customer_email = ?5, customer_phone = ?6, customer_zip = ?7,
            reminded_at = CASE WHEN start_time = ?8 AND end_time = ?9 THEN reminded_at ELSE NULL END,
            start_time = ?8, end_time = ?9, status = ?10, payment_status = ?11,
            final_amount = ?12, updated_at = ?13
         WHERE id = ?14",
        params![
            booking.resource_id,
            booking.slot_id,
            booking.customer_id,
            booking.customer_name,
            booking.customer_email,
            booking.customer_phone,
            booking.customer_zip,
            start,
            end,
            booking.status.as_str(),
            booking.payment_status.as_str(),
            booking.final_amount,
            format_ts(now),
            id,
        ],
    )?;
    Ok(count > 0)
}

pub fn patch_booking(
    conn: &Connection,
    id: i64,
    patch: &BookingPatch,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
            status = COALESCE(?1, status),
            payment_status = COALESCE(?2, payment_status),
            final_amount = CASE WHEN ?4 THEN ?3 ELSE final_amount END,
            updated_at = ?5
         WHERE id = ?6",
        params![
            patch.status.map(|s| s.as_str()),
            patch.payment_status.map(|s| s.as_str()),
            patch.final_amount.flatten(),
            patch.final_amount.is_some(),
            format_ts(now),
            id,
        ],
    )?;
    Ok(count > 0)
}

pub fn update_booking_status(
    conn: &Connection,
    id: i64,
    status: BookingStatus,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), format_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn set_provider_event_id(
    conn: &Connection,
    id: i64,
    event_id: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE bookings SET provider_event_id = ?1 WHERE id = ?2",
        params![event_id, id],
    )?;
    Ok(())
}

pub fn set_customer_event_id(
    conn: &Connection,
    id: i64,
    event_id: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE bookings SET customer_event_id = ?1 WHERE id = ?2",
        params![event_id, id],
    )?;
    Ok(())
}

pub fn delete_booking(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM bookings WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

pub fn get_booking_by_id(conn: &Connection, id: i64) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;

    result.transpose()
}

pub fn find_overlapping_bookings(
    conn: &Connection,
    resource_id: i64,
    interval: &TimeInterval,
    exclude_id: Option<i64>,
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b
         WHERE b.resource_id = ?1
           AND b.status != 'cancelled'
           AND b.start_time < ?3
           AND b.end_time > ?2
           AND (?4 IS NULL OR b.id != ?4)
         ORDER BY b.start_time ASC, b.id ASC"
    );
    collect_bookings(
        conn,
        &sql,
        params![
            resource_id,
            format_ts(&interval.start()),
            format_ts(&interval.end()),
            exclude_id
        ],
    )
}

pub fn get_bookings_by_resource(conn: &Connection, resource_id: i64) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.resource_id = ?1
         ORDER BY b.start_time ASC, b.id ASC"
    );
    collect_bookings(conn, &sql, params![resource_id])
}

pub fn get_bookings_by_customer(conn: &Connection, customer_id: i64) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.customer_id = ?1
         ORDER BY b.start_time ASC, b.id ASC"
    );
    collect_bookings(conn, &sql, params![customer_id])
}

pub fn get_bookings_by_provider(conn: &Connection, provider_id: i64) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b
         INNER JOIN resources r ON r.id = b.resource_id
         WHERE r.provider_id = ?1
         ORDER BY b.start_time ASC, b.id ASC"
    );
    collect_bookings(conn, &sql, params![provider_id])
}

pub fn find_reminder_candidates(
    conn: &Connection,
    window: &TimeInterval,
) -> anyhow::Result<Vec<Booking>> {
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b
         WHERE b.status = 'confirmed'
           AND b.reminded_at IS NULL
           AND b.start_time >= ?1
           AND b.start_time < ?2
         ORDER BY b.start_time ASC, b.id ASC"
    );
    collect_bookings(
        conn,
        &sql,
        params![format_ts(&window.start()), format_ts(&window.end())],
    )
}

// False when the marker was already set.
pub fn mark_reminded(conn: &Connection, id: i64, at: &NaiveDateTime) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET reminded_at = ?1 WHERE id = ?2 AND reminded_at IS NULL",
        params![format_ts(at), id],
    )?;
    Ok(count > 0)
}

fn collect_bookings(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let status_str: String = row.get(10)?;
    let payment_str: String = row.get(11)?;
    let reminded_at: Option<String> = row.get(15)?;

    Ok(Booking {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        slot_id: row.get(2)?,
        customer_id: row.get(3)?,
        customer_name: row.get(4)?,
        customer_email: row.get(5)?,
        customer_phone: row.get(6)?,
        customer_zip: row.get(7)?,
        start_time: parse_ts(&row.get::<_, String>(8)?)?,
        end_time: parse_ts(&row.get::<_, String>(9)?)?,
        status: BookingStatus::parse(&status_str)
            .with_context(|| format!("unknown booking status: {status_str}"))?,
        payment_status: PaymentStatus::parse(&payment_str)
            .with_context(|| format!("unknown payment status: {payment_str}"))?,
        final_amount: row.get(12)?,
        provider_event_id: row.get(13)?,
        customer_event_id: row.get(14)?,
        reminded_at: reminded_at.as_deref().map(parse_ts).transpose()?,
        created_at: parse_ts(&row.get::<_, String>(16)?)?,
        updated_at: parse_ts(&row.get::<_, String>(17)?)?,
    })
}

// ── Payments ──

pub fn create_payment(
    conn: &Connection,
    booking_id: i64,
    amount: f64,
    status: PaymentStatus,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO payments (booking_id, amount, status) VALUES (?1, ?2, ?3)",
        params![booking_id, amount, status.as_str()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_payments_by_booking(conn: &Connection, booking_id: i64) -> anyhow::Result<Vec<Payment>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, amount, status, created_at FROM payments
         WHERE booking_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![booking_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, f64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut payments = vec![];
    for row in rows {
        let (id, booking_id, amount, status, created_at) = row?;
        payments.push(Payment {
            id,
            booking_id,
            amount,
            status: PaymentStatus::parse(&status)
                .with_context(|| format!("unknown payment status: {status}"))?,
            created_at: parse_ts(&created_at)?,
        });
    }
    Ok(payments)
}

pub fn delete_payment(conn: &Connection, id: i64) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM payments WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

// ── Audit ──

#[derive(Debug, Clone)]
pub struct BookingEvent {
    pub booking_id: i64,
    pub action: String,
    pub detail: Option<String>,
}

pub fn record_booking_event(
    conn: &Connection,
    booking_id: i64,
    action: &str,
    detail: Option<&str>,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO booking_events (booking_id, action, detail) VALUES (?1, ?2, ?3)",
        params![booking_id, action, detail],
    )?;
    Ok(())
}

pub fn get_booking_events(conn: &Connection, booking_id: i64) -> anyhow::Result<Vec<BookingEvent>> {
    let mut stmt = conn.prepare(
        "SELECT booking_id, action, detail FROM booking_events WHERE booking_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![booking_id], |row| {
        Ok(BookingEvent {
            booking_id: row.get(0)?,
            action: row.get(1)?,
            detail: row.get(2)?,
        })
    })?;

    let mut events = vec![];
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}
