use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_reference_tables::Migration),
            Box::new(m20240301_000002_create_stock_tables::Migration),
            Box::new(m20240301_000003_create_consultations_table::Migration),
            Box::new(m20240301_000004_create_prescription_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_reference_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_reference_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Medicaments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Medicaments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Medicaments::CommercialName)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Medicaments::GenericName).string().not_null())
                        .col(ColumnDef::new(Medicaments::Dosage).string().not_null())
                        .col(
                            ColumnDef::new(Medicaments::PharmaceuticalForm)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Medicaments::Category).string().null())
                        .col(
                            ColumnDef::new(Medicaments::UnitPrice)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Medicaments::SaleUnit).string().not_null())
                        .col(ColumnDef::new(Medicaments::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Medicaments::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(MedicalDevices::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MedicalDevices::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MedicalDevices::Name).string().not_null())
                        .col(
                            ColumnDef::new(MedicalDevices::ManufacturerReference)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(MedicalDevices::Category).string().null())
                        .col(ColumnDef::new(MedicalDevices::SaleUnit).string().not_null())
                        .col(
                            ColumnDef::new(MedicalDevices::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MedicalDevices::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MedicalDevices::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Medicaments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Medicaments {
        Table,
        Id,
        CommercialName,
        GenericName,
        Dosage,
        PharmaceuticalForm,
        Category,
        UnitPrice,
        SaleUnit,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum MedicalDevices {
        Table,
        Id,
        Name,
        ManufacturerReference,
        Category,
        SaleUnit,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_stock_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_stock_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockLots::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(StockLots::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(StockLots::ProductType).string().not_null())
                        .col(ColumnDef::new(StockLots::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockLots::CenterId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockLots::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockLots::LotNumber).string().not_null())
                        .col(ColumnDef::new(StockLots::ReceivedOn).date().not_null())
                        .col(ColumnDef::new(StockLots::ExpiryDate).date().null())
                        .col(
                            ColumnDef::new(StockLots::AlertThreshold)
                                .integer()
                                .not_null()
                                .default(10),
                        )
                        .col(ColumnDef::new(StockLots::Status).string().not_null())
                        .col(ColumnDef::new(StockLots::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(StockLots::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_lots_product_center_lot")
                        .table(StockLots::Table)
                        .col(StockLots::ProductType)
                        .col(StockLots::ProductId)
                        .col(StockLots::CenterId)
                        .col(StockLots::LotNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_lots_expiry")
                        .table(StockLots::Table)
                        .col(StockLots::ExpiryDate)
                        .to_owned(),
                )
                .await?;

            // No foreign key from movements to lots: ledger rows must
            // survive lot deletion.
            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::ProductType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::LotId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::LotNumber).string().not_null())
                        .col(
                            ColumnDef::new(StockMovements::MovementType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Quantity).integer().not_null())
                        .col(ColumnDef::new(StockMovements::CenterId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::ProfessionalId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::OccurredAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Source).string().null())
                        .col(ColumnDef::new(StockMovements::Comment).string().null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_lot_id")
                        .table(StockMovements::Table)
                        .col(StockMovements::LotId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_product_center")
                        .table(StockMovements::Table)
                        .col(StockMovements::ProductId)
                        .col(StockMovements::CenterId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_occurred_at")
                        .table(StockMovements::Table)
                        .col(StockMovements::OccurredAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockLots::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockLots {
        Table,
        Id,
        ProductType,
        ProductId,
        CenterId,
        Quantity,
        LotNumber,
        ReceivedOn,
        ExpiryDate,
        AlertThreshold,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        ProductType,
        ProductId,
        LotId,
        LotNumber,
        MovementType,
        Quantity,
        CenterId,
        ProfessionalId,
        OccurredAt,
        Source,
        Comment,
        CreatedAt,
    }
}

mod m20240301_000003_create_consultations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_consultations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Consultations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Consultations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Consultations::PatientId).uuid().not_null())
                        .col(ColumnDef::new(Consultations::ProfessionalId).uuid().null())
                        .col(ColumnDef::new(Consultations::CenterId).uuid().not_null())
                        .col(
                            ColumnDef::new(Consultations::ScheduledAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Consultations::Motive).string().null())
                        .col(ColumnDef::new(Consultations::Urgency).string().null())
                        .col(ColumnDef::new(Consultations::Anamnesis).text().null())
                        .col(ColumnDef::new(Consultations::ClinicalExam).text().null())
                        .col(ColumnDef::new(Consultations::Diagnosis).text().null())
                        .col(ColumnDef::new(Consultations::Icd10Code).string().null())
                        .col(ColumnDef::new(Consultations::TreatmentPlan).text().null())
                        .col(ColumnDef::new(Consultations::EvolutionNotes).text().null())
                        .col(ColumnDef::new(Consultations::Status).string().not_null())
                        .col(
                            ColumnDef::new(Consultations::ConsultationType)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Consultations::AppointmentId).uuid().null())
                        .col(
                            ColumnDef::new(Consultations::PreviousConsultationId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Consultations::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Consultations::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Consultations::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_consultations_status")
                        .table(Consultations::Table)
                        .col(Consultations::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_consultations_patient_id")
                        .table(Consultations::Table)
                        .col(Consultations::PatientId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_consultations_professional_status")
                        .table(Consultations::Table)
                        .col(Consultations::ProfessionalId)
                        .col(Consultations::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Consultations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Consultations {
        Table,
        Id,
        PatientId,
        ProfessionalId,
        CenterId,
        ScheduledAt,
        Motive,
        Urgency,
        Anamnesis,
        ClinicalExam,
        Diagnosis,
        Icd10Code,
        TreatmentPlan,
        EvolutionNotes,
        Status,
        ConsultationType,
        AppointmentId,
        PreviousConsultationId,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_prescription_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_prescription_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Prescriptions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Prescriptions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Prescriptions::ConsultationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Prescriptions::ProfessionalId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Prescriptions::Status).string().not_null())
                        .col(ColumnDef::new(Prescriptions::Notes).text().null())
                        .col(
                            ColumnDef::new(Prescriptions::PrescribedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Prescriptions::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Prescriptions::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_prescriptions_consultation")
                                .from(Prescriptions::Table, Prescriptions::ConsultationId)
                                .to(Consultations::Table, Consultations::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PrescriptionLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PrescriptionLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionLines::PrescriptionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionLines::MedicamentId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionLines::QuantityPrescribed)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionLines::Posology)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionLines::DurationDays)
                                .integer()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionLines::Status)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PrescriptionLines::Notes).text().null())
                        .col(
                            ColumnDef::new(PrescriptionLines::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionLines::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_prescription_lines_prescription")
                                .from(PrescriptionLines::Table, PrescriptionLines::PrescriptionId)
                                .to(Prescriptions::Table, Prescriptions::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_prescription_lines_medicament")
                                .from(PrescriptionLines::Table, PrescriptionLines::MedicamentId)
                                .to(Medicaments::Table, Medicaments::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PrescriptionExams::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PrescriptionExams::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionExams::PrescriptionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionExams::ExamType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PrescriptionExams::Label).string().not_null())
                        .col(
                            ColumnDef::new(PrescriptionExams::Instructions)
                                .text()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionExams::Priority)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionExams::Status)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionExams::RequestedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionExams::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PrescriptionExams::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_prescription_exams_prescription")
                                .from(PrescriptionExams::Table, PrescriptionExams::PrescriptionId)
                                .to(Prescriptions::Table, Prescriptions::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Dispensations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Dispensations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Dispensations::PrescriptionLineId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Dispensations::LotId).uuid().not_null())
                        .col(ColumnDef::new(Dispensations::MovementId).uuid().not_null())
                        .col(ColumnDef::new(Dispensations::PatientId).uuid().not_null())
                        .col(
                            ColumnDef::new(Dispensations::ProfessionalId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Dispensations::CenterId).uuid().not_null())
                        .col(
                            ColumnDef::new(Dispensations::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Dispensations::DispensedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Dispensations::Notes).text().null())
                        .col(
                            ColumnDef::new(Dispensations::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_dispensations_prescription_line")
                                .from(Dispensations::Table, Dispensations::PrescriptionLineId)
                                .to(PrescriptionLines::Table, PrescriptionLines::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_dispensations_line_id")
                        .table(Dispensations::Table)
                        .col(Dispensations::PrescriptionLineId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Dispensations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PrescriptionExams::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(PrescriptionLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Prescriptions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Prescriptions {
        Table,
        Id,
        ConsultationId,
        ProfessionalId,
        Status,
        Notes,
        PrescribedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PrescriptionLines {
        Table,
        Id,
        PrescriptionId,
        MedicamentId,
        QuantityPrescribed,
        Posology,
        DurationDays,
        Status,
        Notes,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum PrescriptionExams {
        Table,
        Id,
        PrescriptionId,
        ExamType,
        Label,
        Instructions,
        Priority,
        Status,
        RequestedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Dispensations {
        Table,
        Id,
        PrescriptionLineId,
        LotId,
        MovementId,
        PatientId,
        ProfessionalId,
        CenterId,
        Quantity,
        DispensedAt,
        Notes,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Consultations {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Medicaments {
        Table,
        Id,
    }
}
