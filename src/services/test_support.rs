//! In-memory repositories and a ready-made business for service tests

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{
    availability::AvailabilityCalculator,
    clock::FixedClock,
    conflicts::ConflictValidator,
    holidays::CalendarHolidayGate,
};
use crate::{
    config::SchedulingConfig,
    error::{AppError, AppResult},
    models::{
        appointment::NewAppointment,
        enums::{OverrideType, TimeOffStatus, TimeOffType},
        Appointment, AppointmentStatus, AvailabilityOverride, Business, BusinessPolicy,
        ConflictType, Customer, Owner, SchedulingConflict, Service, ServiceAddon, Staff, TimeOff,
        TimeWindow, WorkingHours,
    },
    repository::{AppointmentRepository, SchedulingRepository},
};

/// Monday 2030-03-04
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 3, 4).unwrap()
}

#[derive(Default)]
struct Tables {
    businesses: Vec<Business>,
    staff: Vec<Staff>,
    customers: Vec<Customer>,
    services: Vec<Service>,
    addons: Vec<ServiceAddon>,
    working_hours: Vec<WorkingHours>,
    time_off: Vec<TimeOff>,
    overrides: Vec<AvailabilityOverride>,
    appointments: Vec<Appointment>,
    next_id: i32,
}

impl Tables {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

/// Both repository ports backed by vectors
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    /// Yield to the scheduler after every appointment read, so joined
    /// futures interleave the way concurrent requests do over a pool
    yield_on_read: AtomicBool,
}

impl InMemoryStore {
    pub fn appointment(&self, uuid: Uuid) -> Option<Appointment> {
        let t = self.tables.lock().unwrap();
        t.appointments.iter().find(|a| a.uuid == uuid).cloned()
    }

    pub fn customer(&self, id: i32) -> Option<Customer> {
        let t = self.tables.lock().unwrap();
        t.customers.iter().find(|c| c.id == id).cloned()
    }

    pub fn yield_on_read(&self) {
        self.yield_on_read.store(true, Ordering::SeqCst);
    }

    pub fn appointment_count(&self) -> usize {
        self.tables.lock().unwrap().appointments.len()
    }

    fn clashes(t: &Tables, staff_id: i32, window: &TimeWindow, exclude: Option<i32>) -> Vec<SchedulingConflict> {
        t.appointments
            .iter()
            .filter(|a| {
                a.staff_id == staff_id
                    && a.blocks_time()
                    && Some(a.id) != exclude
                    && a.window().overlaps(window)
            })
            .map(|a| {
                SchedulingConflict::error(ConflictType::ExistingAppointment, "Slot was taken", window)
                    .with_entity(a.uuid)
            })
            .collect()
    }
}

#[async_trait]
impl SchedulingRepository for InMemoryStore {
    async fn find_business_by_id(&self, id: i32) -> AppResult<Option<Business>> {
        let t = self.tables.lock().unwrap();
        Ok(t.businesses.iter().find(|b| b.id == id).cloned())
    }

    async fn find_business_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Business>> {
        let t = self.tables.lock().unwrap();
        Ok(t.businesses.iter().find(|b| b.uuid == uuid).cloned())
    }

    async fn find_staff_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Staff>> {
        let t = self.tables.lock().unwrap();
        Ok(t.staff.iter().find(|s| s.uuid == uuid).cloned())
    }

    async fn find_staff_by_id(&self, id: i32) -> AppResult<Option<Staff>> {
        let t = self.tables.lock().unwrap();
        Ok(t.staff.iter().find(|s| s.id == id).cloned())
    }

    async fn find_service_by_id(&self, id: i32) -> AppResult<Option<Service>> {
        let t = self.tables.lock().unwrap();
        Ok(t.services.iter().find(|s| s.id == id).cloned())
    }

    async fn find_service_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Service>> {
        let t = self.tables.lock().unwrap();
        Ok(t.services.iter().find(|s| s.uuid == uuid).cloned())
    }

    async fn find_customer_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Customer>> {
        let t = self.tables.lock().unwrap();
        Ok(t.customers.iter().find(|c| c.uuid == uuid).cloned())
    }

    async fn find_addons(&self, service_id: i32, uuids: &[Uuid]) -> AppResult<Vec<ServiceAddon>> {
        let t = self.tables.lock().unwrap();
        Ok(t.addons
            .iter()
            .filter(|a| a.service_id == service_id && a.is_active && uuids.contains(&a.uuid))
            .cloned()
            .collect())
    }

    async fn working_hours(&self, owner: Owner) -> AppResult<Vec<WorkingHours>> {
        let t = self.tables.lock().unwrap();
        Ok(t.working_hours.iter().filter(|w| w.owner == owner).cloned().collect())
    }

    async fn approved_time_off(&self, staff_id: i32, window: TimeWindow) -> AppResult<Vec<TimeOff>> {
        let t = self.tables.lock().unwrap();
        Ok(t.time_off
            .iter()
            .filter(|o| o.owner == Owner::Staff(staff_id) && o.blocks(&window))
            .cloned()
            .collect())
    }

    async fn active_overrides(
        &self,
        staff_id: i32,
        window: TimeWindow,
    ) -> AppResult<Vec<AvailabilityOverride>> {
        let t = self.tables.lock().unwrap();
        Ok(t.overrides
            .iter()
            .filter(|o| {
                o.staff_id == staff_id
                    && o.is_active
                    && o.start_datetime < window.end
                    && window.start < o.end_datetime
            })
            .cloned()
            .collect())
    }

    async fn non_cancelled_appointments(
        &self,
        staff_id: i32,
        window: TimeWindow,
    ) -> AppResult<Vec<Appointment>> {
        let t = self.tables.lock().unwrap();
        Ok(t.appointments
            .iter()
            .filter(|a| a.staff_id == staff_id && a.blocks_time() && a.window().overlaps(&window))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryStore {
    async fn find_by_uuid(&self, uuid: Uuid) -> AppResult<Option<Appointment>> {
        let found = self.appointment(uuid);
        if self.yield_on_read.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        Ok(found)
    }

    async fn insert_if_free(&self, new: &NewAppointment) -> AppResult<Appointment> {
        let mut t = self.tables.lock().unwrap();
        let clashes = Self::clashes(&t, new.staff_id, &new.window(), None);
        if !clashes.is_empty() {
            return Err(AppError::SchedulingConflict(clashes));
        }
        let id = t.next_id();
        let now = Utc::now();
        let appointment = Appointment {
            id,
            uuid: Uuid::new_v4(),
            business_id: new.business_id,
            customer_id: new.customer_id,
            staff_id: new.staff_id,
            service_id: new.service_id,
            scheduled_datetime: new.scheduled_datetime,
            estimated_end_datetime: new.estimated_end_datetime,
            actual_start_datetime: None,
            actual_end_datetime: None,
            duration_minutes: new.duration_minutes,
            status: AppointmentStatus::Tentative,
            previous_status: None,
            status_changed_at: Some(now),
            booking_source: new.booking_source.clone(),
            total_price: new.total_price,
            deposit_required: new.deposit_required,
            deposit_amount: new.deposit_amount,
            cancelled_at: None,
            cancelled_by_staff_id: None,
            cancellation_reason: None,
            cancellation_notes: None,
            cancellation_fee: None,
            no_show_fee: None,
            reschedule_count: 0,
            rescheduled_from_datetime: None,
            customer_notes: new.customer_notes.clone(),
            internal_notes: new.internal_notes.clone(),
            slot_locked: false,
            slot_locked_at: None,
            slot_lock_expires_at: None,
            locked_by_session_id: None,
            created_at: now,
            updated_at: now,
        };
        t.appointments.push(appointment.clone());
        Ok(appointment)
    }

    async fn save_rescheduled(&self, appointment: &Appointment) -> AppResult<Appointment> {
        let mut t = self.tables.lock().unwrap();
        let clashes = Self::clashes(&t, appointment.staff_id, &appointment.window(), Some(appointment.id));
        if !clashes.is_empty() {
            return Err(AppError::SchedulingConflict(clashes));
        }
        let slot = t
            .appointments
            .iter_mut()
            .find(|a| a.id == appointment.id)
            .ok_or_else(|| AppError::NotFound("appointment".to_string()))?;
        *slot = appointment.clone();
        Ok(appointment.clone())
    }

    async fn save_transition(
        &self,
        appointment: &Appointment,
        expected: AppointmentStatus,
    ) -> AppResult<Option<Appointment>> {
        let mut t = self.tables.lock().unwrap();
        let slot = t
            .appointments
            .iter_mut()
            .find(|a| a.id == appointment.id)
            .ok_or_else(|| AppError::NotFound("appointment".to_string()))?;
        if slot.status != expected {
            return Ok(None);
        }
        slot.status = appointment.status;
        slot.previous_status = appointment.previous_status;
        slot.status_changed_at = appointment.status_changed_at;
        slot.actual_start_datetime = appointment.actual_start_datetime;
        slot.actual_end_datetime = appointment.actual_end_datetime;
        slot.cancelled_at = appointment.cancelled_at;
        slot.cancelled_by_staff_id = appointment.cancelled_by_staff_id;
        slot.cancellation_reason = appointment.cancellation_reason;
        slot.cancellation_notes = appointment.cancellation_notes.clone();
        slot.cancellation_fee = appointment.cancellation_fee;
        slot.no_show_fee = appointment.no_show_fee;
        let saved = slot.clone();

        if saved.status == AppointmentStatus::NoShow {
            let customer = t
                .customers
                .iter_mut()
                .find(|c| c.id == saved.customer_id)
                .ok_or_else(|| AppError::NotFound("customer".to_string()))?;
            customer.no_show_count += 1;
        }
        Ok(Some(saved))
    }

    async fn try_lock(
        &self,
        id: i32,
        session_id: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Option<Appointment>> {
        let mut t = self.tables.lock().unwrap();
        let slot = t
            .appointments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AppError::NotFound("appointment".to_string()))?;
        Ok(slot
            .lock_slot(session_id, expires_at - now, now)
            .then(|| slot.clone()))
    }

    async fn release_lock(&self, id: i32, session_id: Option<&str>) -> AppResult<Option<Appointment>> {
        let mut t = self.tables.lock().unwrap();
        let slot = t
            .appointments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AppError::NotFound("appointment".to_string()))?;
        Ok(slot.unlock_slot(session_id).then(|| slot.clone()))
    }

    async fn reap_expired_locks(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut t = self.tables.lock().unwrap();
        let mut cleared = 0;
        for a in t.appointments.iter_mut().filter(|a| a.has_expired_lock(now)) {
            a.clear_lock();
            cleared += 1;
        }
        Ok(cleared)
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// One UTC business open Monday 09:00-17:00 with a 12:00-13:00 break, one
/// staff member with the same hours, a 45 minute service with a 15 minute
/// trailing buffer, and one customer. "Now" is the Friday before.
pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub business: Business,
    pub staff: Staff,
    pub service: Service,
    pub customer: Customer,
    pub holidays: Vec<NaiveDate>,
    pub now: DateTime<Utc>,
}

impl Fixture {
    pub fn standard() -> Self {
        let store = Arc::new(InMemoryStore::default());
        let now = Utc.with_ymd_and_hms(2030, 3, 1, 8, 0, 0).unwrap();

        let business = Business {
            id: 1,
            uuid: Uuid::new_v4(),
            name: "Studio".to_string(),
            timezone: "UTC".to_string(),
            policy: BusinessPolicy {
                cancellation_window_hours: Some(24),
                no_show_fee: Some(Decimal::new(2500, 2)),
                ..BusinessPolicy::default()
            },
        };
        let staff = Staff {
            id: 2,
            uuid: Uuid::new_v4(),
            business_id: business.id,
            name: "Dana".to_string(),
            is_active: true,
            is_bookable: true,
        };
        let service = Service {
            id: 3,
            uuid: Uuid::new_v4(),
            business_id: business.id,
            name: "Haircut".to_string(),
            duration_minutes: 45,
            buffer_before_minutes: 0,
            buffer_after_minutes: 15,
            price: Decimal::new(8000, 2),
            is_active: true,
            min_lead_time_hours: None,
            max_advance_booking_days: None,
        };
        let customer = Customer {
            id: 4,
            uuid: Uuid::new_v4(),
            business_id: business.id,
            name: "Noa".to_string(),
            no_show_count: 0,
        };

        {
            let mut t = store.tables.lock().unwrap();
            t.next_id = 100;
            t.businesses.push(business.clone());
            t.staff.push(staff.clone());
            t.services.push(service.clone());
            t.customers.push(customer.clone());
            for (id, owner) in [(10, Owner::Business(business.id)), (11, Owner::Staff(staff.id))] {
                t.working_hours.push(WorkingHours {
                    id,
                    owner,
                    weekday: Weekday::Mon,
                    start_time: hm(9, 0),
                    end_time: hm(17, 0),
                    break_start_time: Some(hm(12, 0)),
                    break_end_time: Some(hm(13, 0)),
                    is_active: true,
                    effective_from: None,
                    effective_until: None,
                    created_at: now - Duration::days(90),
                });
            }
        }

        Self {
            store,
            business,
            staff,
            service,
            customer,
            holidays: Vec::new(),
            now,
        }
    }

    /// Business-local instant; the fixture business runs on UTC
    pub fn local(&self, date: NaiveDate, h: u32, m: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_time(hm(h, m)))
    }

    pub fn config(&self) -> SchedulingConfig {
        SchedulingConfig {
            region_timezone: "UTC".to_string(),
            ..SchedulingConfig::default()
        }
    }

    pub fn calculator(&self) -> AvailabilityCalculator {
        let holidays = CalendarHolidayGate::new(chrono_tz::UTC, hm(15, 0), self.holidays.clone());
        AvailabilityCalculator::new(
            self.store.clone(),
            Arc::new(holidays),
            Arc::new(FixedClock(self.now)),
        )
    }

    pub fn validator(&self) -> ConflictValidator {
        ConflictValidator::new(self.calculator(), &self.config())
    }

    pub fn set_policy(&mut self, policy: BusinessPolicy) {
        self.business.policy = policy.clone();
        let mut t = self.store.tables.lock().unwrap();
        if let Some(b) = t.businesses.iter_mut().find(|b| b.id == self.business.id) {
            b.policy = policy;
        }
    }

    pub fn set_service_lead_time(&mut self, hours: i32) {
        self.service.min_lead_time_hours = Some(hours);
        let mut t = self.store.tables.lock().unwrap();
        if let Some(s) = t.services.iter_mut().find(|s| s.id == self.service.id) {
            s.min_lead_time_hours = Some(hours);
        }
    }

    pub fn add_addon(&mut self, extra_minutes: i32, price: Decimal) -> ServiceAddon {
        let mut t = self.store.tables.lock().unwrap();
        let addon = ServiceAddon {
            id: t.next_id(),
            uuid: Uuid::new_v4(),
            service_id: self.service.id,
            name: "Wash".to_string(),
            extra_duration_minutes: extra_minutes,
            price,
            is_active: true,
        };
        t.addons.push(addon.clone());
        addon
    }

    pub fn add_time_off(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> TimeOff {
        let mut t = self.store.tables.lock().unwrap();
        let time_off = TimeOff {
            id: t.next_id(),
            uuid: Uuid::new_v4(),
            owner: Owner::Staff(self.staff.id),
            start_datetime: start,
            end_datetime: end,
            time_off_type: TimeOffType::Personal,
            status: TimeOffStatus::Approved,
            reason: None,
            is_all_day: false,
            recurrence_rule: None,
            created_at: self.now - Duration::days(10),
        };
        t.time_off.push(time_off.clone());
        time_off
    }

    pub fn add_override(
        &mut self,
        kind: OverrideType,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AvailabilityOverride {
        let mut t = self.store.tables.lock().unwrap();
        let o = AvailabilityOverride {
            id: t.next_id(),
            uuid: Uuid::new_v4(),
            staff_id: self.staff.id,
            override_type: kind,
            start_datetime: start,
            end_datetime: end,
            is_active: true,
            allow_new_bookings: true,
            max_concurrent_appointments: None,
            title: None,
            reason: None,
            created_at: self.now - Duration::days(1),
        };
        t.overrides.push(o.clone());
        o
    }

    pub fn add_appointment(
        &mut self,
        start: DateTime<Utc>,
        minutes: i32,
        status: AppointmentStatus,
    ) -> Appointment {
        let mut t = self.store.tables.lock().unwrap();
        let id = t.next_id();
        let appointment = Appointment {
            id,
            uuid: Uuid::new_v4(),
            business_id: self.business.id,
            customer_id: self.customer.id,
            staff_id: self.staff.id,
            service_id: self.service.id,
            scheduled_datetime: start,
            estimated_end_datetime: start + Duration::minutes(minutes as i64),
            actual_start_datetime: None,
            actual_end_datetime: None,
            duration_minutes: minutes,
            status,
            previous_status: None,
            status_changed_at: None,
            booking_source: "admin".to_string(),
            total_price: self.service.price,
            deposit_required: false,
            deposit_amount: None,
            cancelled_at: None,
            cancelled_by_staff_id: None,
            cancellation_reason: None,
            cancellation_notes: None,
            cancellation_fee: None,
            no_show_fee: None,
            reschedule_count: 0,
            rescheduled_from_datetime: None,
            customer_notes: None,
            internal_notes: None,
            slot_locked: false,
            slot_locked_at: None,
            slot_lock_expires_at: None,
            locked_by_session_id: None,
            created_at: self.now - Duration::days(2),
            updated_at: self.now - Duration::days(2),
        };
        t.appointments.push(appointment.clone());
        appointment
    }
}
